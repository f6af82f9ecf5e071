//! Brickwall limiter with lookahead
//!
//! A delay ring lets the limiter see upcoming peaks and begin reducing gain
//! before they emerge, avoiding attack-time distortion. With zero lookahead
//! the ring is absent and limiting is instantaneous. The delayed output is
//! always clamped to the ceiling, so the ceiling holds categorically.

use crate::dsp::util;

/// Maximum lookahead in milliseconds; the delay ring is pre-sized for this
/// so changing the lookahead never allocates.
pub const MAX_LOOKAHEAD_MS: f64 = 10.0;

/// Brickwall limiter with configurable lookahead
pub struct Limiter {
    /// Ceiling in dB (e.g., -1.0)
    ceiling_db: f64,

    /// Ceiling as linear amplitude (cached)
    ceiling_linear: f64,

    /// Release time constant (exponential smoothing coefficient)
    release_coeff: f64,

    /// Attack time constant, exp(-1/N_la); unused when lookahead is zero
    attack_coeff: f64,

    /// Delay ring holding the most recent `lookahead_samples` inputs
    ring: Vec<f32>,

    /// Current write/read position in the delay ring
    ring_pos: usize,

    /// Lookahead length in samples
    lookahead_samples: usize,

    /// Smoothed gain (linear, 0.0 to 1.0)
    smoothed_gain: f64,

    /// Current gain reduction in dB (non-negative, for metering)
    gain_reduction_db: f64,

    /// Sample rate
    sample_rate: f64,

    /// Whether limiter is enabled
    enabled: bool,
}

impl Limiter {
    /// Create a new limiter
    ///
    /// # Arguments
    /// * `ceiling_db` - Output ceiling in dB (e.g., -1.0)
    /// * `release_ms` - Release time in milliseconds
    /// * `lookahead_ms` - Lookahead in milliseconds (0 disables the delay)
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(ceiling_db: f64, release_ms: f64, lookahead_ms: f64, sample_rate: f64) -> Self {
        let max_samples = (MAX_LOOKAHEAD_MS * sample_rate / 1000.0).round() as usize;
        let mut limiter = Self {
            ceiling_db: 0.0,
            ceiling_linear: 1.0,
            release_coeff: 0.0,
            attack_coeff: 0.0,
            ring: Vec::with_capacity(max_samples),
            ring_pos: 0,
            lookahead_samples: 0,
            smoothed_gain: 1.0,
            gain_reduction_db: 0.0,
            sample_rate,
            enabled: true,
        };
        limiter.set_ceiling(ceiling_db);
        limiter.set_release_time(release_ms);
        limiter.set_lookahead(lookahead_ms);
        limiter
    }

    /// Create with default parameters (-1 dB ceiling, 50ms release, 5ms lookahead)
    pub fn default_settings(sample_rate: f64) -> Self {
        Self::new(-1.0, 50.0, 5.0, sample_rate)
    }

    /// Set ceiling in dB (clamped to [-6, 0])
    pub fn set_ceiling(&mut self, ceiling_db: f64) {
        self.ceiling_db = ceiling_db.clamp(-6.0, 0.0);
        self.ceiling_linear = util::db_to_gain(self.ceiling_db);
    }

    /// Get current ceiling in dB
    pub fn ceiling_db(&self) -> f64 {
        self.ceiling_db
    }

    /// Set release time in ms (clamped to [10, 500])
    pub fn set_release_time(&mut self, release_ms: f64) {
        self.release_coeff =
            util::one_pole_coeff(release_ms.clamp(10.0, 500.0), self.sample_rate);
    }

    /// Set lookahead in ms (clamped to [0, 10])
    ///
    /// Resizes the delay ring within its pre-allocated capacity and clears
    /// it, so it must not be called from the audio path concurrently with
    /// `process_sample`. The added pipeline latency equals the returned
    /// [`latency_samples`](Self::latency_samples).
    pub fn set_lookahead(&mut self, lookahead_ms: f64) {
        let clamped = lookahead_ms.clamp(0.0, MAX_LOOKAHEAD_MS);
        let samples = (clamped * self.sample_rate / 1000.0).round() as usize;

        if samples != self.lookahead_samples {
            self.lookahead_samples = samples;
            self.ring.clear();
            self.ring.resize(samples, 0.0);
            self.ring_pos = 0;
        }
        self.attack_coeff = if samples > 0 {
            (-1.0 / samples as f64).exp()
        } else {
            0.0
        };
    }

    /// Delay introduced by the lookahead ring, in samples
    pub fn latency_samples(&self) -> usize {
        self.lookahead_samples
    }

    /// Enable or disable the limiter
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Check if limiter is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get current gain reduction in dB (non-negative, for metering)
    pub fn current_gain_reduction(&self) -> f64 {
        self.gain_reduction_db
    }

    #[inline]
    fn update_gain_reduction(&mut self) {
        self.gain_reduction_db = if self.smoothed_gain < 1.0 {
            -util::gain_to_db(self.smoothed_gain, 1e-4)
        } else {
            0.0
        };
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        if !self.enabled {
            return input;
        }

        if self.lookahead_samples == 0 {
            return self.process_sample_instant(input);
        }

        // Exchange the input with the sample delayed by the ring length
        let delayed = self.ring[self.ring_pos] as f64;
        self.ring[self.ring_pos] = input;

        // Peak over the whole lookahead window, current input included
        let mut peak = 0.0f32;
        for &sample in &self.ring {
            peak = peak.max(sample.abs());
        }
        let peak = peak as f64;

        let target_gain = if peak > self.ceiling_linear {
            self.ceiling_linear / peak
        } else {
            1.0
        };

        // Fast attack spread over the lookahead window, slow release
        if target_gain < self.smoothed_gain {
            self.smoothed_gain =
                self.attack_coeff * self.smoothed_gain + (1.0 - self.attack_coeff) * target_gain;
        } else {
            self.smoothed_gain =
                self.release_coeff * self.smoothed_gain + (1.0 - self.release_coeff) * target_gain;
        }

        // The exponential approach lands near the target, not on it; clamp
        // the emitted sample so the ceiling is never exceeded.
        let amplitude = delayed.abs();
        if amplitude * self.smoothed_gain > self.ceiling_linear {
            self.smoothed_gain = self.ceiling_linear / amplitude;
        }

        self.update_gain_reduction();
        self.ring_pos = (self.ring_pos + 1) % self.lookahead_samples;

        (delayed * self.smoothed_gain) as f32
    }

    /// Instantaneous limiting path for zero lookahead
    #[inline]
    fn process_sample_instant(&mut self, input: f32) -> f32 {
        let input_f64 = input as f64;
        let amplitude = input_f64.abs();

        let target_gain = if amplitude > self.ceiling_linear {
            self.ceiling_linear / amplitude
        } else {
            1.0
        };

        if target_gain < self.smoothed_gain {
            // Instant attack
            self.smoothed_gain = target_gain;
        } else {
            self.smoothed_gain =
                self.release_coeff * self.smoothed_gain + (1.0 - self.release_coeff) * target_gain;
        }

        self.update_gain_reduction();
        (input_f64 * self.smoothed_gain) as f32
    }

    /// Process a block of samples in-place
    pub fn process_block_inplace(&mut self, buffer: &mut [f32]) {
        if !self.enabled {
            return;
        }

        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset limiter state
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.ring_pos = 0;
        self.smoothed_gain = 1.0;
        self.gain_reduction_db = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_no_reduction_below_ceiling() {
        let mut lim = Limiter::new(-1.0, 50.0, 0.0, 48000.0);

        let input = 0.5f32; // about -6 dB
        let output = lim.process_sample(input);

        assert!((output - input).abs() < 0.001);
        assert_eq!(lim.current_gain_reduction(), 0.0);
    }

    #[test]
    fn test_limiter_instant_path_brick_wall() {
        let mut lim = Limiter::new(-1.0, 50.0, 0.0, 48000.0);
        let ceiling = util::db_to_gain(-1.0) as f32;

        for _ in 0..100 {
            let output = lim.process_sample(1.5);
            assert!(
                output.abs() <= ceiling + 0.001,
                "output {} exceeded ceiling {}",
                output,
                ceiling
            );
        }
    }

    #[test]
    fn test_limiter_lookahead_latency() {
        let mut lim = Limiter::new(-1.0, 50.0, 5.0, 48000.0);
        assert_eq!(lim.latency_samples(), 240);

        // A quiet constant should emerge after exactly 240 samples of the
        // zero-initialized delay
        let mut first_nonzero = None;
        for i in 0..480 {
            let output = lim.process_sample(0.25);
            if first_nonzero.is_none() && output != 0.0 {
                first_nonzero = Some(i);
            }
        }
        assert_eq!(first_nonzero, Some(240));
    }

    #[test]
    fn test_limiter_impulse_through_lookahead() {
        let mut lim = Limiter::new(-1.0, 50.0, 5.0, 48000.0);
        let ceiling = util::db_to_gain(-1.0) as f32;
        let delay = lim.latency_samples();

        // Impulse of amplitude 2.0 at sample 4800
        for i in 0..9600usize {
            let input = if i == 4800 { 2.0f32 } else { 0.0 };
            let output = lim.process_sample(input);
            if i == 4800 + delay {
                assert!(
                    output.abs() <= ceiling + 1e-4,
                    "delayed impulse {} exceeded ceiling {}",
                    output,
                    ceiling
                );
            }
        }
    }

    #[test]
    fn test_limiter_ceiling_holds_after_warmup() {
        let mut lim = Limiter::new(-3.0, 100.0, 5.0, 48000.0);
        let ceiling = util::db_to_gain(-3.0) as f32;
        let warmup = lim.latency_samples();

        // Loud sine swept through the limiter
        for i in 0..48000usize {
            let t = i as f64 / 48000.0;
            let input = (2.0 * std::f64::consts::PI * 800.0 * t).sin() as f32 * 1.8;
            let output = lim.process_sample(input);
            if i > warmup {
                assert!(
                    output.abs() <= ceiling + 1e-4,
                    "sample {} exceeded ceiling: {}",
                    i,
                    output
                );
            }
        }
    }

    #[test]
    fn test_limiter_release_recovers() {
        let mut lim = Limiter::new(-6.0, 10.0, 0.0, 48000.0);

        for _ in 0..10 {
            lim.process_sample(0.9);
        }
        let held_reduction = lim.current_gain_reduction();
        assert!(held_reduction > 0.0);

        for _ in 0..48000 {
            lim.process_sample(0.1);
        }
        assert!(lim.current_gain_reduction() < held_reduction);
    }

    #[test]
    fn test_limiter_disabled() {
        let mut lim = Limiter::new(-6.0, 50.0, 5.0, 48000.0);
        lim.set_enabled(false);

        let input = 0.9f32;
        assert_eq!(lim.process_sample(input), input);
    }

    #[test]
    fn test_limiter_lookahead_reconfiguration() {
        let mut lim = Limiter::new(-1.0, 50.0, 10.0, 48000.0);
        assert_eq!(lim.latency_samples(), 480);

        lim.set_lookahead(2.5);
        assert_eq!(lim.latency_samples(), 120);

        lim.set_lookahead(0.0);
        assert_eq!(lim.latency_samples(), 0);

        // Out-of-range requests clamp to the supported window
        lim.set_lookahead(50.0);
        assert_eq!(lim.latency_samples(), 480);
    }
}
