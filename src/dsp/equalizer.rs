//! Voice equalizer with fixed topology
//!
//! Band chain: high-pass (rumble) -> low shelf (bass) -> presence peak
//! (clarity) -> high shelf (air) -> optional de-esser. Each band is one
//! RBJ biquad; parameters are validated by clamping to voice-appropriate
//! ranges.

use super::biquad::{Biquad, FilterKind};
use crate::dsp::util;

/// De-esser envelope attack coefficient (fast)
const DEESSER_ATTACK_COEFF: f64 = 0.1;

/// De-esser envelope release coefficient (slow)
const DEESSER_RELEASE_COEFF: f64 = 0.995;

/// Fixed-topology voice equalizer
pub struct Equalizer {
    high_pass: Biquad,
    low_shelf: Biquad,
    presence: Biquad,
    high_shelf: Biquad,

    /// Narrow band-pass sidechain for sibilance detection (Q = 4)
    deesser_detect: Biquad,

    /// Sibilance envelope (linear amplitude)
    deesser_envelope: f64,

    /// De-esser threshold as linear amplitude
    deesser_threshold: f64,

    deesser_enabled: bool,

    sample_rate: f64,
    enabled: bool,
}

impl Equalizer {
    /// Create an equalizer with neutral voice defaults
    pub fn new(sample_rate: f64) -> Self {
        let mut eq = Self {
            high_pass: Biquad::new(FilterKind::HighPass, 80.0, 0.0, 0.7, sample_rate),
            low_shelf: Biquad::new(FilterKind::LowShelf, 200.0, 0.0, 0.707, sample_rate),
            presence: Biquad::new(FilterKind::Peak, 3000.0, 0.0, 1.0, sample_rate),
            high_shelf: Biquad::new(FilterKind::HighShelf, 8000.0, 0.0, 0.707, sample_rate),
            deesser_detect: Biquad::new(FilterKind::BandPass, 6000.0, 0.0, 4.0, sample_rate),
            deesser_envelope: 0.0,
            deesser_threshold: 0.0,
            deesser_enabled: false,
            sample_rate,
            enabled: true,
        };
        eq.set_deesser(6000.0, -20.0);
        eq
    }

    /// Set high-pass band: freq [20, 500] Hz, Q [0.5, 2]
    pub fn set_high_pass(&mut self, freq: f64, q: f64) {
        self.high_pass.configure(
            FilterKind::HighPass,
            freq.clamp(20.0, 500.0),
            0.0,
            q.clamp(0.5, 2.0),
        );
    }

    /// Set low shelf band: freq [80, 300] Hz, gain [-12, 12] dB
    pub fn set_low_shelf(&mut self, freq: f64, gain_db: f64) {
        self.low_shelf.configure(
            FilterKind::LowShelf,
            freq.clamp(80.0, 300.0),
            gain_db.clamp(-12.0, 12.0),
            0.707,
        );
    }

    /// Set presence peak: freq [2000, 6000] Hz, gain [-12, 12] dB, Q [0.5, 4]
    pub fn set_presence(&mut self, freq: f64, gain_db: f64, q: f64) {
        self.presence.configure(
            FilterKind::Peak,
            freq.clamp(2000.0, 6000.0),
            gain_db.clamp(-12.0, 12.0),
            q.clamp(0.5, 4.0),
        );
    }

    /// Set high shelf band: freq [6000, 16000] Hz, gain [-12, 12] dB
    pub fn set_high_shelf(&mut self, freq: f64, gain_db: f64) {
        self.high_shelf.configure(
            FilterKind::HighShelf,
            freq.clamp(6000.0, 16000.0),
            gain_db.clamp(-12.0, 12.0),
            0.707,
        );
    }

    /// Set de-esser detection band and threshold:
    /// freq [4000, 10000] Hz, threshold [-40, 0] dB
    pub fn set_deesser(&mut self, freq: f64, threshold_db: f64) {
        self.deesser_detect.configure(
            FilterKind::BandPass,
            freq.clamp(4000.0, 10000.0),
            0.0,
            4.0,
        );
        self.deesser_threshold = util::db_to_gain(threshold_db.clamp(-40.0, 0.0));
    }

    /// Enable or disable the de-esser stage
    pub fn set_deesser_enabled(&mut self, enabled: bool) {
        self.deesser_enabled = enabled;
    }

    pub fn is_deesser_enabled(&self) -> bool {
        self.deesser_enabled
    }

    /// Enable or disable the whole equalizer
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Process a single sample through the band chain
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        if !self.enabled {
            return input;
        }

        let mut sample = input;
        sample = self.high_pass.process_sample(sample);
        sample = self.low_shelf.process_sample(sample);
        sample = self.presence.process_sample(sample);
        sample = self.high_shelf.process_sample(sample);

        if self.deesser_enabled {
            // Sidechain: extract the sibilance band and follow its envelope
            let sibilance = self.deesser_detect.process_sample(sample) as f64;
            let level = sibilance.abs();

            let coeff = if level > self.deesser_envelope {
                DEESSER_ATTACK_COEFF
            } else {
                DEESSER_RELEASE_COEFF
            };
            self.deesser_envelope = coeff * self.deesser_envelope + (1.0 - coeff) * level;

            // Subtract the over-threshold portion of the sibilance band
            if self.deesser_envelope > self.deesser_threshold {
                let reduction = self.deesser_threshold / self.deesser_envelope;
                sample -= (sibilance * (1.0 - reduction)) as f32;
            }
        }

        sample
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

    /// Reset all band state
    pub fn reset(&mut self) {
        self.high_pass.reset();
        self.low_shelf.reset();
        self.presence.reset();
        self.high_shelf.reset();
        self.deesser_detect.reset();
        self.deesser_envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn peak_after_settle(eq: &mut Equalizer, freq: f64, amplitude: f32, len: usize) -> f32 {
        let mut peak = 0.0f32;
        for i in 0..len {
            let t = i as f64 / 48000.0;
            let input = (2.0 * PI * freq * t).sin() as f32 * amplitude;
            let output = eq.process_sample(input);
            if i > len / 2 {
                peak = peak.max(output.abs());
            }
        }
        peak
    }

    #[test]
    fn test_neutral_settings_pass_midband() {
        let mut eq = Equalizer::new(48000.0);

        // 1 kHz sits above the high-pass and away from the shelves; with all
        // gains at 0 dB it should pass nearly unchanged
        let peak = peak_after_settle(&mut eq, 1000.0, 0.5, 19200);
        assert!((peak - 0.5).abs() < 0.02, "midband changed: {}", peak);
    }

    #[test]
    fn test_high_pass_removes_rumble() {
        let mut eq = Equalizer::new(48000.0);
        eq.set_high_pass(100.0, 0.7);

        let peak = peak_after_settle(&mut eq, 30.0, 0.5, 48000);
        assert!(peak < 0.1, "rumble not attenuated: {}", peak);
    }

    #[test]
    fn test_presence_boost() {
        let mut eq = Equalizer::new(48000.0);
        eq.set_presence(3000.0, 6.0, 1.0);

        let peak = peak_after_settle(&mut eq, 3000.0, 0.25, 19200);
        assert!(peak > 0.4, "presence boost missing: {}", peak);
    }

    #[test]
    fn test_deesser_tames_sibilance() {
        let mut with = Equalizer::new(48000.0);
        with.set_deesser(6000.0, -30.0);
        with.set_deesser_enabled(true);

        let mut without = Equalizer::new(48000.0);

        let with_peak = peak_after_settle(&mut with, 6000.0, 0.5, 48000);
        let without_peak = peak_after_settle(&mut without, 6000.0, 0.5, 48000);

        assert!(
            with_peak < without_peak * 0.7,
            "de-esser ineffective: {} vs {}",
            with_peak,
            without_peak
        );
    }

    #[test]
    fn test_deesser_leaves_quiet_signal_alone() {
        let mut eq = Equalizer::new(48000.0);
        eq.set_deesser(6000.0, -10.0);
        eq.set_deesser_enabled(true);

        // -40 dB sibilance, far under the -10 dB threshold
        let peak = peak_after_settle(&mut eq, 6000.0, 0.01, 19200);
        assert!((peak - 0.01).abs() < 0.003, "quiet band altered: {}", peak);
    }

    #[test]
    fn test_equalizer_disabled_is_identity() {
        let mut eq = Equalizer::new(48000.0);
        eq.set_presence(3000.0, 12.0, 2.0);
        eq.set_enabled(false);

        let input = 0.42f32;
        assert_eq!(eq.process_sample(input), input);
    }

    #[test]
    fn test_parameter_clamping() {
        let mut eq = Equalizer::new(48000.0);

        // Out-of-range values must clamp instead of producing wild filters
        eq.set_high_pass(5.0, 10.0);
        eq.set_low_shelf(1000.0, 40.0);
        eq.set_presence(100.0, -40.0, 0.01);
        eq.set_high_shelf(100000.0, 40.0);

        // A midband tone should still come out finite and bounded
        let peak = peak_after_settle(&mut eq, 1000.0, 0.25, 19200);
        assert!(peak.is_finite());
        assert!(peak < 2.0);
    }
}
