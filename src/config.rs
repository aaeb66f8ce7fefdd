//! Engine configuration
//!
//! Every tunable constant of the sampling loop lives here. Configuration is
//! read from TOML; any section or field left out falls back to the tuned
//! defaults below, so an empty file is a valid configuration.
//!
//! ```toml
//! [sampling]
//! rate_hz = 40.0
//!
//! [threshold]
//! sensitivity = 0.5   # lower = more notes
//!
//! [midi]
//! channel = 0
//! virtual_port = "Plant_MIDI"
//! ```

use crate::error::{PhytoError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on `notes.per_event`
pub const MAX_NOTES_PER_EVENT: u32 = 5;

/// Complete engine configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sampling: SamplingConfig,
    pub filter: FilterConfig,
    pub threshold: ThresholdConfig,
    pub drift: DriftConfig,
    pub gate: GateConfig,
    pub notes: NoteConfig,
    pub control: ControlConfig,
    pub midi: MidiConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Target tick rate of the sampling loop (Hz)
    pub rate_hz: f64,
    /// Full-scale voltage used to normalize pitch and control values
    pub reference_voltage: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rate_hz: 40.0,
            reference_voltage: 3.3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Voltage smoothing coefficient
    pub voltage_alpha: f64,
    /// Derivative smoothing coefficient
    pub derivative_alpha: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            voltage_alpha: 0.18,
            derivative_alpha: 0.30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Noise floor learning rate
    pub noise_alpha: f64,
    /// Noise floor estimate before the first sample
    pub initial_noise: f64,
    /// Lower bound of the noise floor
    pub min_noise: f64,
    /// Threshold = sensitivity * noise floor. Lower means more notes.
    pub sensitivity: f64,
    /// Magnitude must exceed threshold * multiplier to count as strong
    pub multiplier: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            noise_alpha: 0.02,
            initial_noise: 0.01,
            min_noise: 0.0005,
            sensitivity: 0.5,
            multiplier: 1.8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Integrated |d|·dt that forces an event (V)
    pub budget: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self { budget: 0.002 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Require the derivative to change sign for a spontaneous event
    pub sign_change_required: bool,
    /// Micro-refractory between triggers (s)
    pub refractory_s: f64,
    /// Minimum spacing between spontaneous events (s)
    pub min_event_interval: f64,
    /// Suppression added after every accepted event (s)
    pub suppression_min: f64,
    /// Divides the strength-scaled part of the suppression window
    pub suppression_scale: f64,
    /// Send probability of a zero-strength event
    pub probability_base: f64,
    /// Extra send probability at full strength
    pub probability_scale: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            sign_change_required: true,
            refractory_s: 0.08,
            min_event_interval: 3.0,
            suppression_min: 0.4,
            suppression_scale: 2.5,
            probability_base: 0.20,
            probability_scale: 0.6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteConfig {
    /// Pitch at half of the reference voltage
    pub base_note: u8,
    /// Semitones either side of the base note
    pub span: u8,
    /// Nominal hold before note-off (s)
    pub length_s: f64,
    /// Hold is scaled by a uniform draw from this range
    pub length_jitter: (f64, f64),
    /// Probability of offsetting the pitch by one of `jitter_steps`
    pub jitter_probability: f64,
    pub jitter_steps: Vec<i32>,
    /// Notes emitted per accepted event
    pub per_event: u32,
    /// Upper bound of a random delay before each note-on (s); capped at one tick
    pub onset_jitter_max: f64,
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self {
            base_note: 60,
            span: 36,
            length_s: 0.30,
            length_jitter: (0.8, 1.2),
            jitter_probability: 0.45,
            jitter_steps: vec![-5, -3, -2, -1, 0, 1, 2, 3, 5],
            per_event: 1,
            onset_jitter_max: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub enabled: bool,
    /// Controller number (74 = brightness)
    pub controller: u8,
    pub rate_hz: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            controller: 74,
            rate_hz: 10.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Channel (0-15)
    pub channel: u8,
    /// Connect to the first output port whose name contains this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Name of the virtual port to create when no device is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_port: Option<String>,
    /// Send All Sound Off / All Notes Off on connect and shutdown
    pub panic_on_connect: bool,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            device: None,
            virtual_port: Some("Plant_MIDI".to_string()),
            panic_on_connect: true,
        }
    }
}

impl EngineConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PhytoError::ConfigParse(e.to_string()))
    }

    /// Nominal time between two sampling ticks (s)
    pub fn tick_interval(&self) -> f64 {
        1.0 / self.sampling.rate_hz
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval())
    }

    /// Check every precondition the pipeline relies on.
    ///
    /// A configuration that passes guarantees a positive tick interval, a
    /// positive reference voltage and a positive noise floor.
    pub fn validate(&self) -> Result<()> {
        positive("sampling.rate_hz", self.sampling.rate_hz)?;
        positive("sampling.reference_voltage", self.sampling.reference_voltage)?;

        unit_coefficient("filter.voltage_alpha", self.filter.voltage_alpha)?;
        unit_coefficient("filter.derivative_alpha", self.filter.derivative_alpha)?;

        unit_coefficient("threshold.noise_alpha", self.threshold.noise_alpha)?;
        positive("threshold.min_noise", self.threshold.min_noise)?;
        non_negative("threshold.initial_noise", self.threshold.initial_noise)?;
        positive("threshold.sensitivity", self.threshold.sensitivity)?;
        positive("threshold.multiplier", self.threshold.multiplier)?;

        positive("drift.budget", self.drift.budget)?;

        non_negative("gate.refractory_s", self.gate.refractory_s)?;
        non_negative("gate.min_event_interval", self.gate.min_event_interval)?;
        non_negative("gate.suppression_min", self.gate.suppression_min)?;
        positive("gate.suppression_scale", self.gate.suppression_scale)?;
        probability("gate.probability_base", self.gate.probability_base)?;
        probability("gate.probability_scale", self.gate.probability_scale)?;

        if self.notes.base_note > 127 {
            return Err(PhytoError::invalid("notes.base_note", "must be at most 127"));
        }
        positive("notes.length_s", self.notes.length_s)?;
        let (lo, hi) = self.notes.length_jitter;
        positive("notes.length_jitter", lo)?;
        if hi < lo || !hi.is_finite() {
            return Err(PhytoError::invalid(
                "notes.length_jitter",
                format!("upper bound {} is below lower bound {}", hi, lo),
            ));
        }
        probability("notes.jitter_probability", self.notes.jitter_probability)?;
        if self.notes.jitter_probability > 0.0 && self.notes.jitter_steps.is_empty() {
            return Err(PhytoError::invalid(
                "notes.jitter_steps",
                "must not be empty while jitter_probability > 0",
            ));
        }
        if !(1..=MAX_NOTES_PER_EVENT).contains(&self.notes.per_event) {
            return Err(PhytoError::invalid(
                "notes.per_event",
                format!(
                    "must be in 1..={}, got {}",
                    MAX_NOTES_PER_EVENT, self.notes.per_event
                ),
            ));
        }
        non_negative("notes.onset_jitter_max", self.notes.onset_jitter_max)?;

        if self.control.controller > 127 {
            return Err(PhytoError::invalid("control.controller", "must be at most 127"));
        }
        positive("control.rate_hz", self.control.rate_hz)?;

        if self.midi.channel > 15 {
            return Err(PhytoError::invalid("midi.channel", "must be in 0..=15"));
        }

        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PhytoError::invalid(field, format!("must be positive, got {}", value)))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PhytoError::invalid(field, format!("must not be negative, got {}", value)))
    }
}

fn unit_coefficient(field: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(PhytoError::invalid(field, format!("must be in (0, 1], got {}", value)))
    }
}

fn probability(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PhytoError::invalid(field, format!("must be in [0, 1], got {}", value)))
    }
}
