//! Audio device I/O: capture/render adapters, ring buffers, resampling

use thiserror::Error;

pub mod capture;
pub mod device;
pub mod render;
pub mod resampler;
pub mod ring_buffer;

pub use capture::CaptureStream;
pub use device::{find_virtual_output, list_input_devices, list_output_devices, DeviceInfo};
pub use render::RenderStream;
pub use resampler::{Resampler, ResamplerError};
pub use ring_buffer::{AudioConsumer, AudioProducer, AudioRingBuffer};

/// Fixed internal processing sample rate
pub const INTERNAL_SAMPLE_RATE: u32 = 48_000;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio device found")]
    NoDevice,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to query device name: {0}")]
    DeviceName(String),

    #[error("failed to query device config: {0}")]
    DeviceConfig(String),

    #[error("failed to enumerate devices: {0}")]
    Enumerate(String),

    #[error("failed to build stream: {0}")]
    BuildStream(String),

    #[error("failed to start stream: {0}")]
    PlayStream(String),

    #[error("failed to stop stream: {0}")]
    PauseStream(String),
}

/// Format information for an opened audio device
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}
