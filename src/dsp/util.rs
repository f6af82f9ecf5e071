//! Small conversions shared by the dynamics processors.

/// Feedback term for a one-pole smoother, from a time constant in
/// milliseconds. Used as `y = a*y + (1-a)*x`; after `ms` of input the
/// smoother has covered roughly 63% of a step.
#[inline]
pub fn one_pole_coeff(ms: f64, sample_rate: f64) -> f64 {
    let samples = ms.max(0.001) * sample_rate / 1000.0;
    (-1.0 / samples).exp()
}

/// Linear gain for a level in dBFS.
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(db * 0.05)
}

/// Level in dBFS for a linear gain. The magnitude saturates at `floor`
/// so a vanishing input cannot produce negative infinity.
#[inline]
pub fn gain_to_db(gain: f64, floor: f64) -> f64 {
    20.0 * gain.abs().max(floor).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_round_trip() {
        for db in [-60.0, -18.0, -3.0, 0.0, 6.0] {
            let back = gain_to_db(db_to_gain(db), 1e-10);
            assert!((back - db).abs() < 1e-9);
        }
    }

    #[test]
    fn gain_to_db_respects_floor() {
        assert!((gain_to_db(0.0, 1e-4) + 80.0).abs() < 1e-9);
    }

    #[test]
    fn one_pole_coeff_orders_by_time() {
        let fast = one_pole_coeff(1.0, 48000.0);
        let slow = one_pole_coeff(100.0, 48000.0);
        assert!(fast < slow);
        assert!(slow < 1.0);
    }
}
