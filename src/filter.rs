//! Filter stage
//!
//! Exponential smoothing of the raw voltage and of its time derivative.
//! All smoothing state is O(1); no sample history is kept.

use crate::config::FilterConfig;

/// Smoothing state, updated once per tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterState {
    pub ema_v: f64,
    pub prev_ema_v: f64,
    pub ema_d: f64,
    /// Unsmoothed derivative of the previous tick
    pub prev_raw_d: f64,
}

/// Values produced by one filter update
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterOutput {
    /// Smoothed voltage (V)
    pub voltage: f64,
    /// Smoothed derivative (V/s)
    pub derivative: f64,
    /// Derivative of the smoothed voltage before derivative smoothing (V/s)
    pub raw_derivative: f64,
    /// `raw_derivative` of the tick before this one
    pub prev_raw_derivative: f64,
}

#[derive(Debug, Clone)]
pub struct Filter {
    voltage_alpha: f64,
    derivative_alpha: f64,
    state: FilterState,
    seeded: bool,
    last: FilterOutput,
}

impl Filter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            voltage_alpha: config.voltage_alpha,
            derivative_alpha: config.derivative_alpha,
            state: FilterState::default(),
            seeded: false,
            last: FilterOutput::default(),
        }
    }

    /// Feed one voltage reading taken `dt` seconds after the previous one.
    ///
    /// The first reading seeds the voltage average directly, so there is no
    /// warm-up transient and the derivative starts at zero.
    ///
    /// `dt` must be positive. Debug builds panic on a non-positive `dt`;
    /// release builds clamp it to `f64::EPSILON`.
    ///
    /// A NaN or infinite `voltage` is skipped: the state is left untouched
    /// and the previous output is returned again (all zeros before the
    /// first finite reading).
    pub fn update(&mut self, voltage: f64, dt: f64) -> FilterOutput {
        debug_assert!(dt > 0.0, "filter dt must be positive, got {}", dt);
        let dt = if dt > 0.0 { dt } else { f64::EPSILON };

        if !voltage.is_finite() {
            return self.last;
        }

        let s = &mut self.state;
        if !self.seeded {
            self.seeded = true;
            *s = FilterState {
                ema_v: voltage,
                prev_ema_v: voltage,
                ema_d: 0.0,
                prev_raw_d: 0.0,
            };
            self.last = FilterOutput {
                voltage,
                ..FilterOutput::default()
            };
            return self.last;
        }

        s.ema_v = (1.0 - self.voltage_alpha) * s.ema_v + self.voltage_alpha * voltage;

        let raw_d = (s.ema_v - s.prev_ema_v) / dt;
        s.prev_ema_v = s.ema_v;
        s.ema_d = (1.0 - self.derivative_alpha) * s.ema_d + self.derivative_alpha * raw_d;

        let prev_raw_d = s.prev_raw_d;
        s.prev_raw_d = raw_d;

        self.last = FilterOutput {
            voltage: s.ema_v,
            derivative: s.ema_d,
            raw_derivative: raw_d,
            prev_raw_derivative: prev_raw_d,
        };
        self.last
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }
}
