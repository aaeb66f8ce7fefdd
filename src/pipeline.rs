//! Per-tick signal pipeline
//!
//! [`Pipeline`] owns every piece of state that changes from tick to tick:
//! filter, noise floor, drift, gating timestamps and the control cadence.
//! It performs no IO; each call to [`Pipeline::tick`] returns what should be
//! sent, and the caller hands that to the note scheduler.

use crate::classifier::{Candidate, EventClassifier, Verdict};
use crate::config::EngineConfig;
use crate::control::ContinuousEmitter;
use crate::drift::DriftAccumulator;
use crate::filter::Filter;
use crate::notes::{NoteEvent, NoteMapper};
use crate::random::RandomSource;
use crate::sampler::Sample;
use crate::threshold::ThresholdEstimator;
use tracing::{debug, info};

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub t: f64,
    /// Smoothed voltage (V)
    pub voltage: f64,
    /// Smoothed derivative (V/s)
    pub derivative: f64,
    pub threshold: f64,
    pub noise_floor: f64,
    pub forced: bool,
    pub verdict: Verdict,
    /// Controller value due on this tick
    pub control: Option<u8>,
    /// Notes to play, empty unless the verdict is `Accepted`
    pub notes: Vec<NoteEvent>,
}

impl TickOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self.verdict, Verdict::Accepted(_))
    }
}

pub struct Pipeline {
    dt: f64,
    filter: Filter,
    threshold: ThresholdEstimator,
    drift: DriftAccumulator,
    classifier: EventClassifier,
    control: ContinuousEmitter,
    mapper: NoteMapper,
    rng: Box<dyn RandomSource>,
    ticks: u64,
    accepted: u64,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration
    pub fn new(config: &EngineConfig, rng: Box<dyn RandomSource>) -> Self {
        let dt = config.tick_interval();
        let vref = config.sampling.reference_voltage;
        Self {
            dt,
            filter: Filter::new(&config.filter),
            threshold: ThresholdEstimator::new(&config.threshold),
            drift: DriftAccumulator::new(&config.drift),
            classifier: EventClassifier::new(&config.gate, config.threshold.multiplier),
            control: ContinuousEmitter::new(&config.control, vref),
            mapper: NoteMapper::new(&config.notes, vref, dt),
            rng,
            ticks: 0,
            accepted: 0,
        }
    }

    /// Run one sample through filter, threshold, drift and classifier.
    ///
    /// The filter always advances by the nominal tick interval; the sample's
    /// timestamp drives cooldowns and the control cadence.
    pub fn tick(&mut self, sample: Sample) -> TickOutcome {
        self.ticks += 1;

        let filtered = self.filter.update(sample.voltage, self.dt);
        let magnitude = filtered.derivative.abs();
        let threshold = self.threshold.update(magnitude);
        let forced = self.drift.update(magnitude, self.dt);

        let control = self.control.poll(sample.t, filtered.voltage);

        let candidate = Candidate {
            now: sample.t,
            magnitude,
            threshold,
            raw_derivative: filtered.raw_derivative,
            prev_raw_derivative: filtered.prev_raw_derivative,
            forced,
        };
        let verdict = self.classifier.classify(&candidate, self.rng.as_mut());

        let notes = match &verdict {
            Verdict::Accepted(a) => {
                self.accepted += 1;
                let notes = self
                    .mapper
                    .notes(filtered.voltage, a.velocity, self.rng.as_mut());
                for note in &notes {
                    info!(
                        t = sample.t,
                        v = filtered.voltage,
                        d = filtered.derivative,
                        thr = threshold,
                        mag = magnitude,
                        note = note.pitch,
                        vel = note.velocity,
                        chance = a.send_chance,
                        suppress = a.suppression,
                        forced = a.forced,
                        "event"
                    );
                }
                notes
            }
            Verdict::Rejected(reason) => {
                debug!(t = sample.t, mag = magnitude, thr = threshold, ?reason, forced, "rejected");
                Vec::new()
            }
            Verdict::Idle => Vec::new(),
        };

        TickOutcome {
            t: sample.t,
            voltage: filtered.voltage,
            derivative: filtered.derivative,
            threshold,
            noise_floor: self.threshold.noise_floor(),
            forced,
            verdict,
            control,
            notes,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn accepted_events(&self) -> u64 {
        self.accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ConstantRandom;

    fn sample(i: u32, voltage: f64) -> Sample {
        Sample {
            voltage,
            t: i as f64 * 0.025,
        }
    }

    #[test]
    fn test_counts_ticks_and_events() {
        let mut p = Pipeline::new(&EngineConfig::default(), Box::new(ConstantRandom(0.0)));
        p.tick(sample(0, 1.0));
        let out = p.tick(sample(1, 2.0));
        assert!(out.is_accepted());
        assert_eq!(p.ticks(), 2);
        assert_eq!(p.accepted_events(), 1);
        assert_eq!(out.notes.len(), 1);
    }

    #[test]
    fn test_first_tick_reports_seeded_filter() {
        let mut p = Pipeline::new(&EngineConfig::default(), Box::new(ConstantRandom(0.0)));
        let out = p.tick(sample(0, 1.2));
        assert_eq!(out.voltage, 1.2);
        assert_eq!(out.derivative, 0.0);
        assert_eq!(out.verdict, Verdict::Idle);
        assert_eq!(out.control, Some(46));
    }
}
