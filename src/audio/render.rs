//! Render adapter feeding the virtual output device
//!
//! Owns the consumer end of the output ring. The cpal render callback
//! drains it, duplicating the mono signal across the device's channels.
//! Underrun plays a linear fade from the last sample to silence instead of
//! clicking, and is counted. Backlog beyond the high watermark is skipped
//! (the reader advances past the oldest samples) so rendering stays current
//! when downstream stalls momentarily.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use super::ring_buffer::AudioConsumer;
use super::{AudioDeviceInfo, AudioError, INTERNAL_SAMPLE_RATE};

/// Queue depth above which the render callback skips ahead (~100 ms at the
/// internal rate), and the depth it trims back to (~20 ms).
const BACKLOG_MAX_SAMPLES: usize = 4800;
const BACKLOG_TARGET_SAMPLES: usize = 960;

/// Audio output stream draining the processed ring
pub struct RenderStream {
    stream: Stream,
    device_info: AudioDeviceInfo,
}

impl RenderStream {
    /// Look up an output device by id, empty selecting the default.
    pub fn find_device(device_id: &str) -> Result<(Device, AudioDeviceInfo), AudioError> {
        let host = cpal::default_host();

        let device = if device_id.is_empty() {
            host.default_output_device().ok_or(AudioError::NoDevice)?
        } else {
            host.output_devices()
                .map_err(|e| AudioError::Enumerate(e.to_string()))?
                .find(|d| d.name().map(|n| n == device_id).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))?
        };

        let name = device
            .name()
            .map_err(|e| AudioError::DeviceName(e.to_string()))?;

        let config = preferred_output_config(&device)?;

        let info = AudioDeviceInfo {
            name,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };

        Ok((device, info))
    }

    /// Build the render stream on an already selected device.
    ///
    /// `underruns` counts callbacks served with silence; `overruns` counts
    /// backlog samples skipped to stay current.
    pub fn from_device(
        device: Device,
        info: AudioDeviceInfo,
        mut consumer: AudioConsumer,
        underruns: Arc<AtomicU64>,
        overruns: Arc<AtomicU64>,
    ) -> Result<Self, AudioError> {
        let stream_config = StreamConfig {
            channels: info.channels,
            sample_rate: SampleRate(info.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let channels = info.channels.max(1) as usize;
        let mut mono_scratch: Vec<f32> = vec![0.0; 4096];

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Keep latency bounded: overwrite-oldest by advancing
                    // the reader past stale backlog.
                    let queued = consumer.len();
                    if queued > BACKLOG_MAX_SAMPLES {
                        let skipped = consumer.skip(queued - BACKLOG_TARGET_SAMPLES);
                        overruns.fetch_add(skipped as u64, Ordering::Relaxed);
                    }

                    let frames = data.len() / channels;
                    if mono_scratch.len() < frames {
                        mono_scratch.resize(frames, 0.0);
                    }

                    if consumer.len() >= frames {
                        consumer.read(&mut mono_scratch[..frames]);
                        for (frame, &sample) in
                            data.chunks_mut(channels).zip(mono_scratch.iter())
                        {
                            frame.fill(sample);
                        }
                    } else {
                        // Underrun: fade from the last sample to silence
                        underruns.fetch_add(1, Ordering::Relaxed);
                        let last = consumer.last_sample();
                        for (i, frame) in data.chunks_mut(channels).enumerate() {
                            let t = (i + 1) as f32 / frames.max(1) as f32;
                            frame.fill(last * (1.0 - t));
                        }
                    }
                },
                move |err| {
                    tracing::warn!(error = %err, "audio render error");
                },
                None,
            )
            .map_err(|e| AudioError::BuildStream(e.to_string()))?;

        Ok(Self {
            stream,
            device_info: info,
        })
    }

    /// Start rendering
    pub fn start(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Stop rendering
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

/// Prefer a 48 kHz f32 output configuration, falling back to the device
/// default when unavailable. Rendering at the internal rate skips the
/// output resampler entirely.
fn preferred_output_config(device: &Device) -> Result<StreamConfig, AudioError> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;

    if let Some(config) = find_internal_rate_config(supported) {
        return Ok(config);
    }

    let default = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;
    Ok(default.into())
}

fn find_internal_rate_config(
    supported: impl Iterator<Item = SupportedStreamConfigRange>,
) -> Option<StreamConfig> {
    let target = SampleRate(INTERNAL_SAMPLE_RATE);
    supported
        .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
        .find(|range| range.min_sample_rate() <= target && target <= range.max_sample_rate())
        .map(|range| StreamConfig {
            channels: range.channels(),
            sample_rate: target,
            buffer_size: cpal::BufferSize::Default,
        })
}
