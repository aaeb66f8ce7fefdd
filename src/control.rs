//! Continuous control output
//!
//! Maps the smoothed voltage to a 7-bit controller value on a fixed cadence,
//! independent of the sample rate and of note activity.

use crate::config::ControlConfig;
use crate::notes::normalized;

/// Slack when comparing elapsed time against the emit interval, so that
/// accumulated float error in tick timestamps does not skip a beat
const CADENCE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct ContinuousEmitter {
    enabled: bool,
    interval: f64,
    reference_voltage: f64,
    last_emit: Option<f64>,
}

impl ContinuousEmitter {
    pub fn new(config: &ControlConfig, reference_voltage: f64) -> Self {
        Self {
            enabled: config.enabled,
            interval: 1.0 / config.rate_hz,
            reference_voltage,
            last_emit: None,
        }
    }

    /// Controller value due at `now`, if any
    pub fn poll(&mut self, now: f64, voltage: f64) -> Option<u8> {
        if !self.enabled {
            return None;
        }
        if let Some(last) = self.last_emit {
            if now - last < self.interval - CADENCE_TOLERANCE {
                return None;
            }
        }
        self.last_emit = Some(now);
        Some(control_value(voltage, self.reference_voltage))
    }
}

/// `voltage / reference` scaled to 0..=127
pub fn control_value(voltage: f64, reference: f64) -> u8 {
    (normalized(voltage, reference) * 127.0) as u8
}
