//! Adaptive threshold
//!
//! Tracks the running average of derivative magnitude (the noise floor) and
//! derives the trigger threshold from it, so sensitivity follows whatever
//! baseline noise the current plant and electrodes produce.

use crate::config::ThresholdConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdState {
    pub noise_floor: f64,
}

#[derive(Debug, Clone)]
pub struct ThresholdEstimator {
    alpha: f64,
    min_noise: f64,
    sensitivity: f64,
    state: ThresholdState,
}

impl ThresholdEstimator {
    pub fn new(config: &ThresholdConfig) -> Self {
        Self {
            alpha: config.noise_alpha,
            min_noise: config.min_noise,
            sensitivity: config.sensitivity,
            state: ThresholdState {
                noise_floor: config.initial_noise.max(config.min_noise),
            },
        }
    }

    /// Fold one derivative magnitude into the noise floor and return the
    /// resulting threshold. The floor never drops below `min_noise`.
    pub fn update(&mut self, magnitude: f64) -> f64 {
        let magnitude = magnitude.abs();
        let noise = (1.0 - self.alpha) * self.state.noise_floor + self.alpha * magnitude;
        // NaN input must not poison the floor
        self.state.noise_floor = if noise.is_nan() {
            self.min_noise
        } else {
            noise.max(self.min_noise)
        };
        self.threshold()
    }

    pub fn threshold(&self) -> f64 {
        self.sensitivity * self.state.noise_floor
    }

    pub fn noise_floor(&self) -> f64 {
        self.state.noise_floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_never_below_minimum() {
        let config = ThresholdConfig::default();
        let mut est = ThresholdEstimator::new(&config);
        for _ in 0..10_000 {
            est.update(0.0);
            assert!(est.noise_floor() >= config.min_noise);
        }
        assert_eq!(est.noise_floor(), config.min_noise);
        assert!((est.threshold() - config.sensitivity * config.min_noise).abs() < 1e-15);
    }

    #[test]
    fn test_floor_follows_magnitude() {
        let config = ThresholdConfig::default();
        let mut est = ThresholdEstimator::new(&config);
        let thr = est.update(2.16);
        // 0.98 * 0.01 + 0.02 * 2.16
        assert!((est.noise_floor() - 0.053).abs() < 1e-12);
        assert!((thr - 0.5 * 0.053).abs() < 1e-12);
    }

    #[test]
    fn test_negative_magnitude_is_treated_as_absolute() {
        let config = ThresholdConfig::default();
        let mut a = ThresholdEstimator::new(&config);
        let mut b = ThresholdEstimator::new(&config);
        assert_eq!(a.update(-0.4), b.update(0.4));
    }

    #[test]
    fn test_nan_magnitude_falls_back_to_minimum() {
        let config = ThresholdConfig::default();
        let mut est = ThresholdEstimator::new(&config);
        est.update(f64::NAN);
        assert_eq!(est.noise_floor(), config.min_noise);
    }
}
