//! Digital Signal Processing components

pub mod biquad;
pub mod compressor;
pub mod equalizer;
pub mod expander;
pub mod limiter;
pub mod metering;
pub mod util;

pub use biquad::{Biquad, FilterKind};
pub use compressor::Compressor;
pub use equalizer::Equalizer;
pub use expander::Expander;
pub use limiter::{Limiter, MAX_LOOKAHEAD_MS};
pub use metering::{Metering, LOUDNESS_FLOOR_LUFS, METER_FLOOR_DB};
