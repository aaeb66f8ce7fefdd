//! Drift accumulator
//!
//! Integrates |d|·dt so that slow but sustained change still produces notes
//! even when no single tick crosses the threshold.

use crate::config::DriftConfig;

#[derive(Debug, Clone)]
pub struct DriftAccumulator {
    budget: f64,
    accumulated: f64,
}

impl DriftAccumulator {
    pub fn new(config: &DriftConfig) -> Self {
        Self {
            budget: config.budget,
            accumulated: 0.0,
        }
    }

    /// Returns `true` when the accumulated magnitude passes the budget, in
    /// which case the accumulator restarts from zero.
    pub fn update(&mut self, magnitude: f64, dt: f64) -> bool {
        let step = magnitude.abs() * dt;
        if step.is_finite() {
            self.accumulated += step;
        }
        if self.accumulated > self.budget {
            self.accumulated = 0.0;
            true
        } else {
            false
        }
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forces_within_budget_ticks() {
        let config = DriftConfig { budget: 0.002 };
        let mut drift = DriftAccumulator::new(&config);
        let (m, dt) = (0.03, 0.025);
        let bound = (config.budget / (m * dt)).ceil() as usize;

        let fired_at = (1..=bound).find(|_| drift.update(m, dt));
        assert!(fired_at.is_some(), "no forced event within {} ticks", bound);
        assert_eq!(drift.accumulated(), 0.0);
    }

    #[test]
    fn test_zero_magnitude_never_forces() {
        let mut drift = DriftAccumulator::new(&DriftConfig::default());
        for _ in 0..100_000 {
            assert!(!drift.update(0.0, 0.025));
        }
    }

    #[test]
    fn test_resets_and_fires_periodically() {
        let mut drift = DriftAccumulator::new(&DriftConfig { budget: 1.0 });
        let fires: Vec<usize> = (0..10).filter(|_| drift.update(0.45, 1.0)).collect();
        // 0.45, 0.9, 1.35 -> fire; repeats every third tick
        assert_eq!(fires, vec![2, 5, 8]);
    }

    #[test]
    fn test_sign_of_derivative_is_ignored() {
        let mut drift = DriftAccumulator::new(&DriftConfig { budget: 1.0 });
        drift.update(-0.5, 1.0);
        assert!((drift.accumulated() - 0.5).abs() < 1e-12);
    }
}
