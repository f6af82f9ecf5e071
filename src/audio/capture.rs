//! Microphone capture adapter built on cpal
//!
//! Thin wrapper around a cpal input stream: it delivers raw f32 blocks to
//! the registered callback as `(samples, frames, device_rate, channels)` on
//! the capture thread. Downmixing and rate conversion belong to the
//! pipeline, not the adapter.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};

use super::{AudioDeviceInfo, AudioError};

/// Callback receiving `(samples, frames, sample_rate, channels)`
pub type CaptureCallback = Box<dyn FnMut(&[f32], usize, u32, u16) + Send + 'static>;

/// Audio input stream delivering device-format f32 blocks
pub struct CaptureStream {
    stream: Stream,
    device_info: AudioDeviceInfo,
}

impl CaptureStream {
    /// Look up an input device by id, empty/None selecting the default.
    pub fn find_device(device_id: Option<&str>) -> Result<(Device, AudioDeviceInfo), AudioError> {
        let host = cpal::default_host();

        let device = match device_id {
            Some(id) if !id.is_empty() => host
                .input_devices()
                .map_err(|e| AudioError::Enumerate(e.to_string()))?
                .find(|d| d.name().map(|n| n == id).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))?,
            _ => host.default_input_device().ok_or(AudioError::NoDevice)?,
        };

        let name = device
            .name()
            .map_err(|e| AudioError::DeviceName(e.to_string()))?;
        let config = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;

        let info = AudioDeviceInfo {
            name,
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };

        Ok((device, info))
    }

    /// Build the capture stream on an already selected device.
    pub fn from_device(
        device: Device,
        info: AudioDeviceInfo,
        mut callback: CaptureCallback,
    ) -> Result<Self, AudioError> {
        let config = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;
        let stream_config: StreamConfig = config.into();

        let sample_rate = info.sample_rate;
        let channels = info.channels;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let frames = data.len() / channels.max(1) as usize;
                    callback(data, frames, sample_rate, channels);
                },
                move |err| {
                    tracing::warn!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| AudioError::BuildStream(e.to_string()))?;

        Ok(Self {
            stream,
            device_info: info,
        })
    }

    /// Start delivering capture callbacks
    pub fn start(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Stop delivering capture callbacks
    pub fn stop(&self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::PauseStream(e.to_string()))
    }

    /// Format of the opened device
    pub fn device_info(&self) -> &AudioDeviceInfo {
        &self.device_info
    }
}
