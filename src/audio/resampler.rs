//! Sample-rate conversion between a device rate and the internal 48 kHz rate
//!
//! Linear interpolation indexed by a double-precision fractional position.
//! The residual position and the last input frame are carried across calls,
//! so feeding a signal in arbitrary block sizes yields the same output as
//! feeding it in one piece. When the rates match, processing is a verbatim
//! copy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResamplerError {
    #[error("invalid sample rate: {0}")]
    InvalidRate(u32),

    #[error("invalid channel count: {0}")]
    InvalidChannels(usize),
}

/// Streaming linear-interpolation resampler.
pub struct Resampler {
    src_rate: u32,
    dst_rate: u32,
    channels: usize,

    /// Input-samples-per-output-sample step.
    ratio: f64,

    /// Fractional read position into the stream extended by one prior frame.
    /// Position 1.0 is the first frame of the current block; positions in
    /// [0, 1) interpolate between the retained last frame and the first
    /// frame of the current block.
    position: f64,

    /// Last input frame of the previous block, one sample per channel.
    last_frame: Vec<f32>,
}

impl Resampler {
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Result<Self, ResamplerError> {
        if src_rate == 0 {
            return Err(ResamplerError::InvalidRate(src_rate));
        }
        if dst_rate == 0 {
            return Err(ResamplerError::InvalidRate(dst_rate));
        }
        if channels == 0 {
            return Err(ResamplerError::InvalidChannels(channels));
        }

        Ok(Self {
            src_rate,
            dst_rate,
            channels,
            ratio: src_rate as f64 / dst_rate as f64,
            position: 1.0,
            last_frame: vec![0.0; channels],
        })
    }

    pub fn src_rate(&self) -> u32 {
        self.src_rate
    }

    pub fn dst_rate(&self) -> u32 {
        self.dst_rate
    }

    /// Worst-case output length (in samples) for `frames` input frames.
    /// Useful for sizing reusable output buffers at initialization.
    pub fn max_output_len(&self, frames: usize) -> usize {
        ((frames as f64 / self.ratio).ceil() as usize + 2) * self.channels
    }

    /// Resample one block, appending output frames to `output`.
    ///
    /// `output` is cleared first. Callers on the realtime path must reserve
    /// [`max_output_len`](Self::max_output_len) capacity up front so the
    /// push loop never reallocates.
    pub fn process_into(&mut self, input: &[f32], output: &mut Vec<f32>) {
        output.clear();

        if self.src_rate == self.dst_rate {
            output.extend_from_slice(input);
            return;
        }

        let frames = input.len() / self.channels;
        if frames == 0 {
            return;
        }

        // Extended stream: frame 0 is the retained last frame, frames
        // 1..=frames are the current block. Interpolation between extended
        // frames i and i+1 is valid while i + 1 <= frames.
        while self.position < frames as f64 {
            let idx = self.position as usize;
            let frac = self.position - idx as f64;

            for ch in 0..self.channels {
                let a = if idx == 0 {
                    self.last_frame[ch]
                } else {
                    input[(idx - 1) * self.channels + ch]
                };
                let b = input[idx * self.channels + ch];
                output.push((a as f64 * (1.0 - frac) + b as f64 * frac) as f32);
            }

            self.position += self.ratio;
        }

        // Carry the residual position and last frame into the next block.
        self.position -= frames as f64;
        if self.position < 0.0 {
            self.position = 0.0;
        }
        let tail = (frames - 1) * self.channels;
        self.last_frame
            .copy_from_slice(&input[tail..tail + self.channels]);
    }

    /// Convenience wrapper returning a fresh vector. Not for the realtime
    /// path; capture-side use only.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let frames = input.len() / self.channels.max(1);
        let mut output = Vec::with_capacity(self.max_output_len(frames));
        self.process_into(input, &mut output);
        output
    }

    pub fn reset(&mut self) {
        self.position = 1.0;
        self.last_frame.fill(0.0);
    }
}
