//! Level metering: decaying peak, rolling RMS, short-term loudness
//!
//! Per processed block the meter updates (a) a peak detector that decays
//! exponentially outside the block, (b) RMS over a rolling 300 ms window
//! that restarts when the window fills, and (c) a simplified short-term
//! loudness over a 3 s window using the LUFS formula
//! `-0.691 + 10*log10(mean_square)` without K-weighting.

use crate::dsp::util;

/// RMS window length in milliseconds
const RMS_WINDOW_MS: f64 = 300.0;

/// Loudness window length in milliseconds
const LUFS_WINDOW_MS: f64 = 3000.0;

/// Meter floor for peak and RMS in dBFS
pub const METER_FLOOR_DB: f32 = -96.0;

/// Meter floor for loudness in LUFS
pub const LOUDNESS_FLOOR_LUFS: f32 = -70.0;

/// Block-oriented level meter
pub struct Metering {
    sample_rate: f64,

    /// Peak detector state (linear) and cached dB value
    peak: f64,
    peak_db: f32,
    peak_decay_coeff: f64,

    /// Rolling RMS accumulation
    rms_sum: f64,
    rms_count: usize,
    rms_window: usize,
    rms_db: f32,

    /// Squared-sample ring for the loudness window plus its running sum
    lufs_buffer: Vec<f32>,
    lufs_pos: usize,
    lufs_sum: f64,
    lufs: f32,
}

impl Metering {
    pub fn new(sample_rate: f64) -> Self {
        let rms_window = (RMS_WINDOW_MS * sample_rate / 1000.0) as usize;
        let lufs_window = (LUFS_WINDOW_MS * sample_rate / 1000.0) as usize;

        let mut meter = Self {
            sample_rate,
            peak: 0.0,
            peak_db: METER_FLOOR_DB,
            peak_decay_coeff: 0.0,
            rms_sum: 0.0,
            rms_count: 0,
            rms_window,
            rms_db: METER_FLOOR_DB,
            lufs_buffer: vec![0.0; lufs_window],
            lufs_pos: 0,
            lufs_sum: 0.0,
            lufs: LOUDNESS_FLOOR_LUFS,
        };
        meter.set_peak_decay(1500.0);
        meter
    }

    /// Set peak decay time in ms (clamped to [100, 5000])
    pub fn set_peak_decay(&mut self, decay_ms: f64) {
        self.peak_decay_coeff =
            util::one_pole_coeff(decay_ms.clamp(100.0, 5000.0), self.sample_rate);
    }

    /// Feed one block of samples
    pub fn process(&mut self, buffer: &[f32]) {
        if buffer.is_empty() {
            return;
        }

        let mut block_peak = 0.0f64;
        let mut block_sum = 0.0f64;

        for &sample in buffer {
            let sample = sample as f64;
            block_peak = block_peak.max(sample.abs());

            let squared = sample * sample;
            block_sum += squared;

            // Loudness ring: replace the oldest squared sample, keep the
            // running sum in step
            let old = self.lufs_buffer[self.lufs_pos] as f64;
            self.lufs_buffer[self.lufs_pos] = squared as f32;
            self.lufs_sum += squared as f32 as f64 - old;
            self.lufs_pos = (self.lufs_pos + 1) % self.lufs_buffer.len();
        }

        // Peak: capture block maxima, decay otherwise
        if block_peak > self.peak {
            self.peak = block_peak;
        } else {
            self.peak *= self.peak_decay_coeff.powi(buffer.len() as i32);
        }
        self.peak_db = if self.peak > 1e-10 {
            (20.0 * self.peak.log10()) as f32
        } else {
            METER_FLOOR_DB
        };

        // Rolling RMS; restart the window when it fills, seeding with the
        // current block so the level never gaps
        self.rms_sum += block_sum;
        self.rms_count += buffer.len();
        if self.rms_count >= self.rms_window {
            let rms = (self.rms_sum / self.rms_count as f64).sqrt();
            self.rms_db = if rms > 1e-10 {
                (20.0 * rms.log10()) as f32
            } else {
                METER_FLOOR_DB
            };
            self.rms_sum = block_sum;
            self.rms_count = buffer.len();
        }

        // Simplified loudness over the 3 s window
        let mean_square = (self.lufs_sum / self.lufs_buffer.len() as f64).max(0.0);
        self.lufs = if mean_square > 1e-10 {
            (-0.691 + 10.0 * mean_square.log10()) as f32
        } else {
            LOUDNESS_FLOOR_LUFS
        };
    }

    /// Current peak level in dBFS
    pub fn peak_db(&self) -> f32 {
        self.peak_db
    }

    /// Current RMS level in dBFS
    pub fn rms_db(&self) -> f32 {
        self.rms_db
    }

    /// Current short-term loudness in LUFS
    pub fn loudness_lufs(&self) -> f32 {
        self.lufs
    }

    /// Reset all meter state to the floor
    pub fn reset(&mut self) {
        self.peak = 0.0;
        self.peak_db = METER_FLOOR_DB;
        self.rms_sum = 0.0;
        self.rms_count = 0;
        self.rms_db = METER_FLOOR_DB;
        self.lufs_buffer.fill(0.0);
        self.lufs_pos = 0;
        self.lufs_sum = 0.0;
        self.lufs = LOUDNESS_FLOOR_LUFS;
    }
}
