//! clearmic - real-time AI microphone enhancer engine
//!
//! Processing chain: Mic Input → AI Denoiser → Expander → Voice EQ →
//! Compressor → Limiter → Virtual Output
//!
//! Audio is captured from a physical input device, enhanced on a dedicated
//! real-time thread in 10 ms blocks at 48 kHz, and rendered to a virtual
//! loopback device that downstream applications open as their microphone.

pub mod ai;
pub mod audio;
pub mod config;
pub mod control;
pub mod dsp;
pub mod pipeline;

// Re-export main types
pub use ai::{DenoiseEngine, Denoiser, NoiseModel, RnnDenoiser, DENOISE_FRAME_SIZE};
pub use audio::{AudioRingBuffer, Resampler, INTERNAL_SAMPLE_RATE};
pub use config::{Config, Preset};
pub use dsp::{Biquad, Compressor, Equalizer, Expander, Limiter, Metering};
pub use pipeline::{
    MeterSink, Pipeline, PipelineError, PipelineHandle, ProcessorChain, PROCESSING_BLOCK_SIZE,
};
