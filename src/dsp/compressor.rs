//! Feed-forward compressor with soft-knee gain computer
//!
//! Peak envelope follower with asymmetric attack/release, quadratic soft
//! knee around the threshold, and linear-domain gain smoothing to avoid
//! zipper noise.

use crate::dsp::util;

/// Soft-knee feed-forward compressor
pub struct Compressor {
    /// Threshold in dB - compression starts above this level
    threshold_db: f64,

    /// Compression ratio (e.g., 4.0 = 4:1 ratio)
    ratio: f64,

    /// Knee width in dB for soft-knee transition
    knee_db: f64,

    /// Attack time constant (exponential smoothing coefficient)
    attack_coeff: f64,

    /// Release time constant (exponential smoothing coefficient)
    release_coeff: f64,

    /// Makeup gain as linear multiplier (cached)
    makeup_gain: f64,

    /// Makeup gain in dB
    makeup_gain_db: f64,

    /// Current envelope level (linear amplitude)
    envelope: f64,

    /// Smoothed linear gain (zipper-noise suppression)
    smoothed_gain: f64,

    /// Current gain reduction in dB (non-negative, for metering)
    gain_reduction_db: f64,

    /// Sample rate
    sample_rate: f64,

    /// Whether compressor is enabled
    enabled: bool,
}

/// Linear-domain gain smoothing coefficient (fixed, per-sample)
const GAIN_SMOOTH_COEFF: f64 = 0.99;

impl Compressor {
    /// Create a new compressor
    ///
    /// # Arguments
    /// * `threshold_db` - Threshold in dB (e.g., -18.0)
    /// * `ratio` - Compression ratio (e.g., 4.0 for 4:1)
    /// * `knee_db` - Soft knee width in dB (0 = hard knee)
    /// * `attack_ms` - Attack time in milliseconds
    /// * `release_ms` - Release time in milliseconds
    /// * `makeup_gain_db` - Makeup gain in dB
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(
        threshold_db: f64,
        ratio: f64,
        knee_db: f64,
        attack_ms: f64,
        release_ms: f64,
        makeup_gain_db: f64,
        sample_rate: f64,
    ) -> Self {
        let mut comp = Self {
            threshold_db: 0.0,
            ratio: 1.0,
            knee_db: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup_gain: 1.0,
            makeup_gain_db: 0.0,
            envelope: 0.0,
            smoothed_gain: 1.0,
            gain_reduction_db: 0.0,
            sample_rate,
            enabled: true,
        };
        comp.set_threshold(threshold_db);
        comp.set_ratio(ratio);
        comp.set_knee(knee_db);
        comp.set_attack_time(attack_ms);
        comp.set_release_time(release_ms);
        comp.set_makeup_gain(makeup_gain_db);
        comp
    }

    /// Create with default parameters suitable for voice
    pub fn default_voice(sample_rate: f64) -> Self {
        Self::new(-18.0, 4.0, 6.0, 10.0, 100.0, 6.0, sample_rate)
    }

    /// Set threshold in dB (clamped to [-40, 0])
    pub fn set_threshold(&mut self, threshold_db: f64) {
        self.threshold_db = threshold_db.clamp(-40.0, 0.0);
    }

    /// Get current threshold in dB
    pub fn threshold_db(&self) -> f64 {
        self.threshold_db
    }

    /// Set compression ratio (clamped to [1, 20])
    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.clamp(1.0, 20.0);
    }

    /// Get current ratio
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Set knee width in dB (clamped to [0, 12])
    pub fn set_knee(&mut self, knee_db: f64) {
        self.knee_db = knee_db.clamp(0.0, 12.0);
    }

    /// Set attack time in ms (clamped to [0.1, 100])
    pub fn set_attack_time(&mut self, attack_ms: f64) {
        self.attack_coeff =
            util::one_pole_coeff(attack_ms.clamp(0.1, 100.0), self.sample_rate);
    }

    /// Set release time in ms (clamped to [10, 1000])
    pub fn set_release_time(&mut self, release_ms: f64) {
        self.release_coeff =
            util::one_pole_coeff(release_ms.clamp(10.0, 1000.0), self.sample_rate);
    }

    /// Set makeup gain in dB (clamped to [0, 24])
    pub fn set_makeup_gain(&mut self, makeup_gain_db: f64) {
        self.makeup_gain_db = makeup_gain_db.clamp(0.0, 24.0);
        self.makeup_gain = util::db_to_gain(self.makeup_gain_db);
    }

    /// Get makeup gain in dB
    pub fn makeup_gain_db(&self) -> f64 {
        self.makeup_gain_db
    }

    /// Enable or disable the compressor
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Check if compressor is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get current gain reduction in dB (non-negative, for metering)
    pub fn current_gain_reduction(&self) -> f64 {
        self.gain_reduction_db
    }

    /// Gain change in dB for a given input level in dB (always <= 0)
    #[inline]
    fn compute_gain_db(&self, input_db: f64) -> f64 {
        let knee_start = self.threshold_db - self.knee_db / 2.0;
        let knee_end = self.threshold_db + self.knee_db / 2.0;

        let output_db = if input_db < knee_start {
            input_db
        } else if input_db > knee_end || self.knee_db <= 0.0 {
            self.threshold_db + (input_db - self.threshold_db) / self.ratio
        } else {
            // Quadratic knee: slope chosen so the curve meets the
            // compression line tangentially at the knee end
            let x = input_db - knee_start;
            let slope = (1.0 / self.ratio - 1.0) / (2.0 * self.knee_db);
            input_db + slope * x * x
        };

        output_db - input_db
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        if !self.enabled {
            return input;
        }

        let input_f64 = input as f64;
        let level = input_f64.abs();

        // Envelope follower (peak detector with attack/release)
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

        // Below the log singularity floor: pass through with the smoothed
        // gain so resuming signal does not step
        if self.envelope < 1e-10 {
            return (input_f64 * self.smoothed_gain * self.makeup_gain) as f32;
        }

        let envelope_db = 20.0 * self.envelope.log10();
        let gain_db = self.compute_gain_db(envelope_db);
        self.gain_reduction_db = -gain_db;

        let gain = util::db_to_gain(gain_db);

        // Smooth gain changes to avoid zipper noise
        self.smoothed_gain =
            GAIN_SMOOTH_COEFF * self.smoothed_gain + (1.0 - GAIN_SMOOTH_COEFF) * gain;

        (input_f64 * self.smoothed_gain * self.makeup_gain) as f32
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

    /// Reset compressor state
    pub fn reset(&mut self) {
        self.envelope = 0.0;
        self.smoothed_gain = 1.0;
        self.gain_reduction_db = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the compressor to steady state with a constant-level signal
    /// and return the final output magnitude.
    fn settled_output(comp: &mut Compressor, level: f32) -> f32 {
        let mut output = 0.0f32;
        for _ in 0..96000 {
            output = comp.process_sample(level);
        }
        output.abs()
    }

    #[test]
    fn test_compressor_no_compression_below_threshold() {
        let mut comp = Compressor::new(-20.0, 4.0, 0.0, 10.0, 200.0, 0.0, 48000.0);

        // About -60 dB, well below threshold
        let output = settled_output(&mut comp, 0.001);

        assert!((output - 0.001).abs() < 0.0001);
        assert!(comp.current_gain_reduction() < 0.01);
    }

    #[test]
    fn test_compressor_reduces_gain_above_threshold() {
        let mut comp = Compressor::new(-20.0, 4.0, 0.0, 0.1, 200.0, 0.0, 48000.0);

        // About -10 dB, 10 dB above threshold: expect ~7.5 dB reduction
        let output = settled_output(&mut comp, 0.3162);

        assert!(comp.current_gain_reduction() > 5.0);
        assert!(output < 0.2);
    }

    #[test]
    fn test_compressor_makeup_gain() {
        let mut comp = Compressor::new(-20.0, 4.0, 0.0, 10.0, 200.0, 6.0, 48000.0);

        // Quiet signal below threshold: only makeup gain applies (~2x)
        let output = settled_output(&mut comp, 0.001);
        assert!(output > 0.0015);
    }

    #[test]
    fn test_compressor_disabled() {
        let mut comp = Compressor::new(-20.0, 4.0, 0.0, 10.0, 200.0, 6.0, 48000.0);
        comp.set_enabled(false);

        let input = 0.5f32;
        assert_eq!(comp.process_sample(input), input);
    }

    #[test]
    fn test_soft_knee_gentler_than_hard_knee() {
        let comp_hard = Compressor::new(-20.0, 4.0, 0.0, 10.0, 200.0, 0.0, 48000.0);
        let comp_soft = Compressor::new(-20.0, 4.0, 12.0, 10.0, 200.0, 0.0, 48000.0);

        // -18 dB is inside the 12 dB knee region [-26, -14]
        let hard = comp_hard.compute_gain_db(-18.0);
        let soft = comp_soft.compute_gain_db(-18.0);

        assert!(hard < 0.0, "hard knee should compress at -18 dB");
        assert!(
            soft > hard,
            "soft knee ({:.2}) should reduce less than hard knee ({:.2})",
            soft,
            hard
        );

        // Well above the knee both behave the same
        let hard_high = comp_hard.compute_gain_db(-5.0);
        let soft_high = comp_soft.compute_gain_db(-5.0);
        assert!((hard_high - soft_high).abs() < 0.5);
    }

    #[test]
    fn test_output_monotonically_nonincreasing_in_ratio() {
        let level = 0.3162f32; // -10 dB, above a -18 dB threshold
        let mut previous = f32::MAX;

        for ratio in [1.5, 2.0, 4.0, 8.0, 16.0] {
            let mut comp = Compressor::new(-18.0, ratio, 0.0, 5.0, 100.0, 0.0, 48000.0);
            let output = settled_output(&mut comp, level);
            assert!(
                output <= previous + 1e-6,
                "output rose from {} to {} at ratio {}",
                previous,
                output,
                ratio
            );
            previous = output;
        }
    }

    #[test]
    fn test_output_monotonically_nondecreasing_in_threshold() {
        let level = 0.3162f32; // -10 dB
        let mut previous = 0.0f32;

        for threshold in [-30.0, -24.0, -18.0, -12.0] {
            let mut comp = Compressor::new(threshold, 4.0, 0.0, 5.0, 100.0, 0.0, 48000.0);
            let output = settled_output(&mut comp, level);
            assert!(
                output >= previous - 1e-6,
                "output fell from {} to {} at threshold {}",
                previous,
                output,
                threshold
            );
            previous = output;
        }
    }
}
