//! RNNoise backend with 480-sample frame alignment
//!
//! The model consumes exactly 480 samples (10 ms at 48 kHz) per inference.
//! Input is staged into a frame accumulator; each completed frame is
//! denoised and appended to an output FIFO primed with one frame of
//! silence, giving the processor a fixed one-frame latency and letting
//! `process_block_inplace` accept any block size without allocating.

use nnnoiseless::DenoiseState;

use super::Denoiser;

/// Frame size the model requires (10 ms at 48 kHz)
pub const DENOISE_FRAME_SIZE: usize = 480;

/// Scaling factor to map [-1.0, 1.0] to the 16-bit range RNNoise expects
const PCM_SCALE: f32 = 32768.0;

/// Output FIFO capacity: one priming frame plus one in-flight frame
const FIFO_CAPACITY: usize = DENOISE_FRAME_SIZE * 2;

/// CPU RNNoise denoiser with frame buffering and wet/dry blending
pub struct RnnDenoiser {
    denoiser: Box<DenoiseState<'static>>,

    /// Staging buffer collecting input until a full frame is available
    accum: [f32; DENOISE_FRAME_SIZE],
    accum_len: usize,

    /// Scratch frames for the inference step
    scaled: [f32; DENOISE_FRAME_SIZE],
    denoised: [f32; DENOISE_FRAME_SIZE],

    /// Output FIFO ring, primed with one frame of silence
    fifo: [f32; FIFO_CAPACITY],
    fifo_read: usize,
    fifo_len: usize,

    /// Wet fraction derived from attenuation_db: 0.0 dry, 1.0 processed
    wet: f32,
    attenuation_db: f32,

    enabled: bool,

    /// Completed inference count, exposed for alignment verification
    frames_processed: u64,

    /// Voice-activity probability reported by the last inference
    last_vad: f32,
}

impl RnnDenoiser {
    pub fn new(attenuation_db: f32) -> Self {
        let mut denoiser = Self {
            denoiser: DenoiseState::new(),
            accum: [0.0; DENOISE_FRAME_SIZE],
            accum_len: 0,
            scaled: [0.0; DENOISE_FRAME_SIZE],
            denoised: [0.0; DENOISE_FRAME_SIZE],
            fifo: [0.0; FIFO_CAPACITY],
            fifo_read: 0,
            fifo_len: DENOISE_FRAME_SIZE,
            wet: 1.0,
            attenuation_db: -60.0,
            enabled: true,
            frames_processed: 0,
            last_vad: 0.0,
        };
        denoiser.set_attenuation_db(attenuation_db);
        denoiser
    }

    /// Number of completed 480-sample inferences
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Voice probability of the most recent frame, [0, 1]
    pub fn voice_probability(&self) -> f32 {
        self.last_vad
    }

    pub fn attenuation_db(&self) -> f32 {
        self.attenuation_db
    }

    #[inline]
    fn fifo_push_frame(&mut self, frame: &[f32; DENOISE_FRAME_SIZE]) {
        debug_assert!(self.fifo_len + DENOISE_FRAME_SIZE <= FIFO_CAPACITY);
        let mut pos = (self.fifo_read + self.fifo_len) % FIFO_CAPACITY;
        for &sample in frame.iter() {
            self.fifo[pos] = sample;
            pos = (pos + 1) % FIFO_CAPACITY;
        }
        self.fifo_len += DENOISE_FRAME_SIZE;
    }

    #[inline]
    fn fifo_pop(&mut self) -> f32 {
        debug_assert!(self.fifo_len > 0);
        let sample = self.fifo[self.fifo_read];
        self.fifo_read = (self.fifo_read + 1) % FIFO_CAPACITY;
        self.fifo_len -= 1;
        sample
    }

    /// Run inference on the completed accumulator frame and queue the
    /// blended result.
    fn process_accumulated_frame(&mut self) {
        // Scale to the PCM-like range the model was trained on
        for (dst, &src) in self.scaled.iter_mut().zip(self.accum.iter()) {
            *dst = (src * PCM_SCALE).clamp(-32760.0, 32760.0);
        }

        self.last_vad = self
            .denoiser
            .process_frame(&mut self.denoised, &self.scaled);

        // Scale back and blend processed against dry
        let wet = self.wet;
        let mut out = [0.0f32; DENOISE_FRAME_SIZE];
        for i in 0..DENOISE_FRAME_SIZE {
            let processed = self.denoised[i] / PCM_SCALE;
            let dry = self.accum[i];
            out[i] = wet * processed + (1.0 - wet) * dry;
        }

        self.fifo_push_frame(&out);
        self.frames_processed += 1;
        self.accum_len = 0;
    }
}

impl Denoiser for RnnDenoiser {
    /// Process samples in place with a fixed one-frame latency.
    ///
    /// Per input sample the FIFO holds at least one queued sample (it is
    /// primed with a frame of silence and refilled whenever a frame
    /// completes), so the exchange below never underruns.
    fn process_block_inplace(&mut self, buffer: &mut [f32]) {
        if !self.enabled {
            return;
        }

        for sample in buffer.iter_mut() {
            self.accum[self.accum_len] = *sample;
            self.accum_len += 1;

            if self.accum_len == DENOISE_FRAME_SIZE {
                self.process_accumulated_frame();
            }

            *sample = self.fifo_pop();
        }
    }

    fn reset(&mut self) {
        self.denoiser = DenoiseState::new();
        self.accum_len = 0;
        self.fifo.fill(0.0);
        self.fifo_read = 0;
        self.fifo_len = DENOISE_FRAME_SIZE;
        self.frames_processed = 0;
        self.last_vad = 0.0;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 0 dB keeps the dry signal, -60 dB keeps the fully processed signal;
    /// values in between blend linearly in dB.
    fn set_attenuation_db(&mut self, attenuation_db: f32) {
        self.attenuation_db = attenuation_db.clamp(-60.0, 0.0);
        self.wet = self.attenuation_db / -60.0;
    }

    fn latency_samples(&self) -> usize {
        DENOISE_FRAME_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Alignment property: any mix of block sizes invokes inference on
    /// exactly one 480-sample frame per 480 input samples.
    #[test]
    fn test_frame_alignment_across_block_sizes() {
        for &block in &[1usize, 17, 480, 1024, 4800] {
            let mut denoiser = RnnDenoiser::new(-60.0);
            let mut fed = 0usize;

            let mut buffer = vec![0.01f32; block];
            while fed < 9600 {
                denoiser.process_block_inplace(&mut buffer);
                fed += block;
            }

            assert_eq!(
                denoiser.frames_processed(),
                (fed / DENOISE_FRAME_SIZE) as u64,
                "block size {}",
                block
            );
        }
    }

    #[test]
    fn test_one_frame_latency() {
        let mut denoiser = RnnDenoiser::new(-60.0);

        // The first 480 output samples are the priming silence
        let mut buffer = vec![0.5f32; DENOISE_FRAME_SIZE];
        denoiser.process_block_inplace(&mut buffer);
        assert!(buffer.iter().all(|&s| s == 0.0));

        // After one frame of latency the signal flows
        let mut next = vec![0.5f32; DENOISE_FRAME_SIZE];
        denoiser.process_block_inplace(&mut next);
        assert!(next.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_output_sample_count_matches_input() {
        let mut denoiser = RnnDenoiser::new(-60.0);
        for &block in &[7usize, 333, 480, 941] {
            let mut buffer = vec![0.1f32; block];
            denoiser.process_block_inplace(&mut buffer);
            assert_eq!(buffer.len(), block);
        }
    }

    #[test]
    fn test_fully_dry_blend_is_delayed_identity() {
        // 0 dB attenuation keeps the dry signal; output equals input
        // delayed by exactly one frame
        let mut denoiser = RnnDenoiser::new(0.0);

        let first: Vec<f32> = (0..480).map(|i| (i as f32 / 480.0) - 0.5).collect();
        let mut block = first.clone();
        denoiser.process_block_inplace(&mut block);

        let mut second = vec![0.0f32; 480];
        denoiser.process_block_inplace(&mut second);

        for (out, expected) in second.iter().zip(first.iter()) {
            assert!((out - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_disabled_passes_through_untouched() {
        let mut denoiser = RnnDenoiser::new(-60.0);
        denoiser.set_enabled(false);

        let original: Vec<f32> = (0..100).map(|i| i as f32 * 0.001).collect();
        let mut buffer = original.clone();
        denoiser.process_block_inplace(&mut buffer);
        assert_eq!(buffer, original);
        assert_eq!(denoiser.frames_processed(), 0);
    }

    #[test]
    fn test_attenuation_clamping() {
        let mut denoiser = RnnDenoiser::new(20.0);
        assert_eq!(denoiser.attenuation_db(), 0.0);

        denoiser.set_attenuation_db(-120.0);
        assert_eq!(denoiser.attenuation_db(), -60.0);
    }

    #[test]
    fn test_reset_restores_priming_latency() {
        let mut denoiser = RnnDenoiser::new(-60.0);

        let mut buffer = vec![0.5f32; 1024];
        denoiser.process_block_inplace(&mut buffer);
        assert!(denoiser.frames_processed() > 0);

        denoiser.reset();
        assert_eq!(denoiser.frames_processed(), 0);

        let mut fresh = vec![0.5f32; DENOISE_FRAME_SIZE];
        denoiser.process_block_inplace(&mut fresh);
        assert!(fresh.iter().all(|&s| s == 0.0));
    }
}
