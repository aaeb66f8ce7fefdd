//! Pitch, velocity and length of outgoing notes
//!
//! Pitch follows the absolute electrical state: half the reference voltage
//! lands on `base_note`, the rails land `span` semitones either side. No scale
//! or harmony is applied here; that is left to whatever receives the MIDI.

use crate::config::NoteConfig;
use crate::random::RandomSource;
use serde::Serialize;

/// One note to play
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteEvent {
    /// 0..=127
    pub pitch: u8,
    /// 1..=127
    pub velocity: u8,
    /// Seconds between note-on and note-off
    pub hold_duration: f64,
    /// Seconds to wait before the note-on
    pub onset_delay: f64,
}

#[derive(Debug, Clone)]
pub struct NoteMapper {
    config: NoteConfig,
    reference_voltage: f64,
    /// Upper bound of the onset delay after capping to one tick
    max_onset_delay: f64,
}

impl NoteMapper {
    pub fn new(config: &NoteConfig, reference_voltage: f64, tick_interval: f64) -> Self {
        Self {
            config: config.clone(),
            reference_voltage,
            max_onset_delay: config.onset_jitter_max.min(tick_interval).max(0.0),
        }
    }

    /// Pitch for a smoothed voltage before jitter
    pub fn base_pitch(&self, voltage: f64) -> i32 {
        let pos = normalized(voltage, self.reference_voltage);
        (self.config.base_note as f64 + (pos - 0.5) * 2.0 * self.config.span as f64) as i32
    }

    /// Build the notes for one accepted event
    pub fn notes(
        &self,
        voltage: f64,
        velocity: u8,
        rng: &mut dyn RandomSource,
    ) -> Vec<NoteEvent> {
        let base = self.base_pitch(voltage);
        let velocity = velocity.clamp(1, 127);

        (0..self.config.per_event)
            .map(|_| {
                let jitter = if !self.config.jitter_steps.is_empty()
                    && rng.chance(self.config.jitter_probability)
                {
                    self.config.jitter_steps[rng.pick(self.config.jitter_steps.len())]
                } else {
                    0
                };
                let pitch = base.saturating_add(jitter).clamp(0, 127) as u8;
                let (lo, hi) = self.config.length_jitter;
                let hold_duration = self.config.length_s * rng.uniform(lo, hi);
                let onset_delay = if self.max_onset_delay > 0.0 {
                    rng.uniform(0.0, self.max_onset_delay)
                } else {
                    0.0
                };

                NoteEvent {
                    pitch,
                    velocity,
                    hold_duration,
                    onset_delay,
                }
            })
            .collect()
    }
}

/// `voltage / reference` clamped to [0, 1]; NaN maps to the bottom
pub fn normalized(voltage: f64, reference: f64) -> f64 {
    let pos = voltage / reference;
    if pos.is_nan() {
        0.0
    } else {
        pos.clamp(0.0, 1.0)
    }
}
