//! Downward expander with hysteresis gating
//!
//! Attenuates signal below the threshold, acting as a soft noise gate for
//! breath and room tone between phrases. The gate state uses dual thresholds
//! (hysteresis) so the open/close decision does not chatter near the
//! boundary.

use crate::dsp::util;

/// Downward expander with IIR envelope detection
pub struct Expander {
    /// Threshold as linear amplitude
    threshold: f64,

    /// Expansion ratio (1.0 = no expansion)
    ratio: f64,

    /// Attack time constant (exponential smoothing coefficient)
    attack_coeff: f64,

    /// Release time constant (exponential smoothing coefficient)
    release_coeff: f64,

    /// Hysteresis as a linear multiplier on the threshold
    hysteresis: f64,

    /// Current envelope level (linear amplitude)
    envelope: f64,

    /// Gate state: open above threshold, closes below threshold/hysteresis
    gate_open: bool,

    /// Current gain reduction in dB (non-negative, for metering)
    gain_reduction_db: f64,

    /// Sample rate
    sample_rate: f64,

    /// Whether expander is enabled
    enabled: bool,
}

impl Expander {
    /// Create a new expander
    ///
    /// # Arguments
    /// * `threshold_db` - Threshold in dB below which expansion starts
    /// * `ratio` - Expansion ratio (e.g. 2.0)
    /// * `attack_ms` - Attack time in milliseconds
    /// * `release_ms` - Release time in milliseconds
    /// * `hysteresis_db` - Gap between the open and close thresholds in dB
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(
        threshold_db: f64,
        ratio: f64,
        attack_ms: f64,
        release_ms: f64,
        hysteresis_db: f64,
        sample_rate: f64,
    ) -> Self {
        let mut expander = Self {
            threshold: 0.0,
            ratio: 1.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            hysteresis: 1.0,
            envelope: 0.0,
            gate_open: false,
            gain_reduction_db: 0.0,
            sample_rate,
            enabled: true,
        };
        expander.set_threshold(threshold_db);
        expander.set_ratio(ratio);
        expander.set_attack_time(attack_ms);
        expander.set_release_time(release_ms);
        expander.set_hysteresis(hysteresis_db);
        expander
    }

    /// Create with default parameters suitable for voice
    pub fn default_voice(sample_rate: f64) -> Self {
        Self::new(-40.0, 2.0, 5.0, 100.0, 3.0, sample_rate)
    }

    /// Set threshold in dB (clamped to [-60, 0])
    pub fn set_threshold(&mut self, threshold_db: f64) {
        self.threshold = util::db_to_gain(threshold_db.clamp(-60.0, 0.0));
    }

    /// Get current threshold in dB
    pub fn threshold_db(&self) -> f64 {
        util::gain_to_db(self.threshold, 1e-10)
    }

    /// Set expansion ratio (clamped to [1, 10])
    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.clamp(1.0, 10.0);
    }

    /// Get current ratio
    pub fn ratio(&self) -> f64 {
        self.ratio
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

    /// Set hysteresis in dB (clamped to [0, 10])
    pub fn set_hysteresis(&mut self, hysteresis_db: f64) {
        self.hysteresis = util::db_to_gain(hysteresis_db.clamp(0.0, 10.0));
    }

    /// Enable or disable the expander
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Check if expander is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the hysteresis gate is currently open
    pub fn is_open(&self) -> bool {
        self.gate_open
    }

    /// Get current gain reduction in dB (non-negative, for metering)
    pub fn current_gain_reduction(&self) -> f64 {
        self.gain_reduction_db
    }

    /// Compute the linear gain for the current envelope level
    #[inline]
    fn compute_gain(&mut self, envelope: f64) -> f64 {
        if envelope < 1e-10 {
            // -60 dB floor for vanishing envelopes
            self.gain_reduction_db = 60.0;
            return 0.001;
        }

        let envelope_db = 20.0 * envelope.log10();
        let threshold_db = 20.0 * self.threshold.log10();

        if envelope_db < threshold_db {
            let below_db = threshold_db - envelope_db;
            let expansion_db = below_db * (self.ratio - 1.0);
            self.gain_reduction_db = expansion_db;
            util::db_to_gain(-expansion_db)
        } else {
            self.gain_reduction_db = 0.0;
            1.0
        }
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        if !self.enabled {
            return input;
        }

        let input_f64 = input as f64;
        let level = input_f64.abs();

        // Envelope follower with asymmetric attack/release
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

        // Hysteresis: once open, the gate only closes below threshold/hyst
        let close_threshold = self.threshold / self.hysteresis;
        if self.envelope > self.threshold {
            self.gate_open = true;
        } else if self.envelope < close_threshold {
            self.gate_open = false;
        }

        let gain = self.compute_gain(self.envelope);
        (input_f64 * gain) as f32
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

    /// Reset expander state
    pub fn reset(&mut self) {
        self.envelope = 0.0;
        self.gate_open = false;
        self.gain_reduction_db = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expander_attenuates_below_threshold() {
        let mut exp = Expander::new(-40.0, 2.0, 0.1, 10.0, 3.0, 48000.0);

        // Signal well below threshold (-60 dB)
        let input = 0.001f32;
        let mut output = input;
        for _ in 0..48000 {
            output = exp.process_sample(input);
        }

        // 20 dB below a -40 dB threshold at 2:1 gives 20 dB reduction
        assert!(output.abs() < input.abs() * 0.5);
        assert!(exp.current_gain_reduction() > 10.0);
    }

    #[test]
    fn test_expander_unity_above_threshold() {
        let mut exp = Expander::new(-40.0, 2.0, 0.1, 100.0, 3.0, 48000.0);

        // -20 dB signal, well above the -40 dB threshold
        let input = 0.1f32;
        let mut output = 0.0f32;
        for _ in 0..48000 {
            output = exp.process_sample(input);
        }

        assert!((output - input).abs() < 0.001);
        assert_eq!(exp.current_gain_reduction(), 0.0);
    }

    #[test]
    fn test_expander_hysteresis_gate() {
        let mut exp = Expander::new(-20.0, 2.0, 0.1, 10.0, 6.0, 48000.0);

        // Push the envelope above the open threshold (-20 dB = 0.1)
        for _ in 0..48000 {
            exp.process_sample(0.3);
        }
        assert!(exp.is_open());

        // Drop to a level between the close threshold (-26 dB ~ 0.05) and
        // the open threshold; the gate must stay open.
        for _ in 0..48000 {
            exp.process_sample(0.07);
        }
        assert!(exp.is_open());

        // Drop below the close threshold; the gate must close.
        for _ in 0..48000 {
            exp.process_sample(0.01);
        }
        assert!(!exp.is_open());
    }

    #[test]
    fn test_expander_disabled() {
        let mut exp = Expander::new(-40.0, 4.0, 5.0, 100.0, 3.0, 48000.0);
        exp.set_enabled(false);

        let input = 0.0001f32;
        let output = exp.process_sample(input);

        assert_eq!(output, input);
    }

    #[test]
    fn test_expander_parameter_clamping() {
        let mut exp = Expander::new(-200.0, 50.0, 0.0, 1e6, 99.0, 48000.0);
        assert!((exp.threshold_db() - (-60.0)).abs() < 0.01);
        assert_eq!(exp.ratio(), 10.0);

        exp.set_ratio(0.2);
        assert_eq!(exp.ratio(), 1.0);
    }
}
