//! Event classifier
//!
//! Decides once per tick whether the current moment is worth a note. A tick
//! becomes a candidate when it is strong (and, by default, the derivative
//! changed sign) or when drift forced it. Candidates then pass three gates:
//!
//! 1. flood guard: spontaneous candidates inside the suppression window of
//!    the previous event are dropped. Drift-forced candidates skip this gate.
//! 2. micro-refractory: any candidate within `refractory_s` of the last
//!    trigger is dropped, forced or not.
//! 3. probability gate: spontaneous candidates are sent with a chance that
//!    grows with their strength. Forced candidates always pass.
//!
//! An accepted event moves the suppression window forward. Stronger events
//! earn a shorter window.

use crate::config::GateConfig;
use crate::random::RandomSource;

/// Cooldown timestamps, in seconds on the sample clock
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GatingState {
    pub last_trigger_time: Option<f64>,
    pub last_event_release_time: Option<f64>,
}

/// Everything the classifier looks at for one tick
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub now: f64,
    /// |smoothed derivative|
    pub magnitude: f64,
    pub threshold: f64,
    pub raw_derivative: f64,
    pub prev_raw_derivative: f64,
    /// Drift budget exhausted on this tick
    pub forced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    FloodGuard,
    Refractory,
    ProbabilityGate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceptance {
    /// How far the magnitude exceeded the threshold, in [0, 1]
    pub strength: f64,
    pub send_chance: f64,
    /// Length of the quiet window started by this event (s)
    pub suppression: f64,
    pub velocity: u8,
    pub forced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Nothing interesting on this tick
    Idle,
    Rejected(RejectReason),
    Accepted(Acceptance),
}

impl Verdict {
    pub fn accepted(&self) -> Option<&Acceptance> {
        match self {
            Verdict::Accepted(a) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventClassifier {
    config: GateConfig,
    multiplier: f64,
    state: GatingState,
}

impl EventClassifier {
    /// `multiplier` scales the threshold a magnitude must beat to be strong
    pub fn new(config: &GateConfig, multiplier: f64) -> Self {
        Self {
            config: config.clone(),
            multiplier,
            state: GatingState::default(),
        }
    }

    pub fn classify(&mut self, c: &Candidate, rng: &mut dyn RandomSource) -> Verdict {
        let is_strong = c.magnitude > c.threshold * self.multiplier;
        let sign_change = sign(c.raw_derivative) != sign(c.prev_raw_derivative);
        let spontaneous = if self.config.sign_change_required {
            is_strong && sign_change
        } else {
            is_strong
        };

        if !(c.forced || spontaneous) {
            return Verdict::Idle;
        }

        if !c.forced {
            if let Some(release) = self.state.last_event_release_time {
                if c.now - release < self.config.min_event_interval {
                    return Verdict::Rejected(RejectReason::FloodGuard);
                }
            }
        }

        if let Some(last) = self.state.last_trigger_time {
            if c.now - last <= self.config.refractory_s {
                return Verdict::Rejected(RejectReason::Refractory);
            }
        }

        let strength = strength(c.magnitude, c.threshold);
        let send_chance = self.config.probability_base + self.config.probability_scale * strength;
        if !(c.forced || rng.chance(send_chance)) {
            return Verdict::Rejected(RejectReason::ProbabilityGate);
        }

        let suppression = self.config.suppression_min
            + self.config.min_event_interval * (1.0 - 0.9 * strength)
                / self.config.suppression_scale;
        self.state.last_trigger_time = Some(c.now);
        self.state.last_event_release_time = Some(c.now + suppression);

        Verdict::Accepted(Acceptance {
            strength,
            send_chance,
            suppression,
            velocity: velocity(strength),
            forced: c.forced,
        })
    }

    pub fn state(&self) -> &GatingState {
        &self.state
    }
}

/// Three-valued sign; zero is its own sign
fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Excess of `magnitude` over `threshold`, normalized to [0, 1]
pub fn strength(magnitude: f64, threshold: f64) -> f64 {
    if threshold > 0.0 {
        ((magnitude - threshold) / (threshold * 2.0)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Note velocity for a given strength, always in 1..=127
pub fn velocity(strength: f64) -> u8 {
    let v = 25.0 + strength * 102.0;
    if v.is_nan() {
        return 25;
    }
    v.clamp(1.0, 127.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ConstantRandom;

    const ACCEPT: ConstantRandom = ConstantRandom(0.0);
    const REJECT: ConstantRandom = ConstantRandom(0.999);

    fn classifier() -> EventClassifier {
        EventClassifier::new(&GateConfig::default(), 1.8)
    }

    fn strong(now: f64) -> Candidate {
        Candidate {
            now,
            magnitude: 1.0,
            threshold: 0.01,
            raw_derivative: 5.0,
            prev_raw_derivative: -5.0,
            forced: false,
        }
    }

    fn forced(now: f64) -> Candidate {
        Candidate {
            now,
            magnitude: 0.0,
            threshold: 0.01,
            raw_derivative: 0.0,
            prev_raw_derivative: 0.0,
            forced: true,
        }
    }

    #[test]
    fn test_weak_tick_is_idle() {
        let mut c = classifier();
        let mut cand = strong(1.0);
        cand.magnitude = 0.015; // below 0.01 * 1.8
        assert_eq!(c.classify(&cand, &mut ACCEPT.clone()), Verdict::Idle);
    }

    #[test]
    fn test_strong_without_sign_change_is_idle() {
        let mut c = classifier();
        let mut cand = strong(1.0);
        cand.prev_raw_derivative = 3.0;
        assert_eq!(c.classify(&cand, &mut ACCEPT.clone()), Verdict::Idle);
    }

    #[test]
    fn test_sign_change_can_be_relaxed() {
        let config = GateConfig {
            sign_change_required: false,
            ..GateConfig::default()
        };
        let mut c = EventClassifier::new(&config, 1.8);
        let mut cand = strong(1.0);
        cand.prev_raw_derivative = 3.0;
        assert!(c.classify(&cand, &mut ACCEPT.clone()).accepted().is_some());
    }

    #[test]
    fn test_zero_to_positive_counts_as_sign_change() {
        let mut c = classifier();
        let mut cand = strong(1.0);
        cand.prev_raw_derivative = 0.0;
        assert!(c.classify(&cand, &mut ACCEPT.clone()).accepted().is_some());
    }

    #[test]
    fn test_full_strength_acceptance() {
        let mut c = classifier();
        let verdict = c.classify(&strong(10.0), &mut ACCEPT.clone());
        let a = verdict.accepted().copied().unwrap();
        assert_eq!(a.strength, 1.0);
        assert_eq!(a.velocity, 127);
        assert!((a.send_chance - 0.8).abs() < 1e-12);
        // 0.4 + 3.0 * 0.1 / 2.5
        assert!((a.suppression - 0.52).abs() < 1e-12);
        assert_eq!(c.state().last_trigger_time, Some(10.0));
        let release = c.state().last_event_release_time.unwrap();
        assert!((release - 10.52).abs() < 1e-9);
    }

    #[test]
    fn test_probability_gate_rejects() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&strong(1.0), &mut REJECT.clone()),
            Verdict::Rejected(RejectReason::ProbabilityGate)
        );
        assert_eq!(c.state().last_trigger_time, None);
    }

    #[test]
    fn test_flood_guard_blocks_spontaneous_events() {
        let mut c = classifier();
        c.classify(&strong(10.0), &mut ACCEPT.clone());
        // release at 10.52; next allowed at 13.52
        assert_eq!(
            c.classify(&strong(13.0), &mut ACCEPT.clone()),
            Verdict::Rejected(RejectReason::FloodGuard)
        );
        assert!(c
            .classify(&strong(13.6), &mut ACCEPT.clone())
            .accepted()
            .is_some());
    }

    #[test]
    fn test_forced_skips_flood_guard_but_not_refractory() {
        let mut c = classifier();
        c.classify(&strong(10.0), &mut ACCEPT.clone());

        assert_eq!(
            c.classify(&forced(10.05), &mut REJECT.clone()),
            Verdict::Rejected(RejectReason::Refractory)
        );
        let a = c.classify(&forced(10.2), &mut REJECT.clone());
        assert!(a.accepted().map(|a| a.forced).unwrap_or(false));
    }

    #[test]
    fn test_forced_acceptance_moves_suppression_window() {
        let mut c = classifier();
        let a = *c.classify(&forced(5.0), &mut REJECT.clone()).accepted().unwrap();
        assert_eq!(a.strength, 0.0);
        assert_eq!(a.velocity, 25);
        // 0.4 + 3.0 / 2.5
        let release = c.state().last_event_release_time.unwrap();
        assert!((release - 6.6).abs() < 1e-9);
        assert_eq!(
            c.classify(&strong(6.0), &mut ACCEPT.clone()),
            Verdict::Rejected(RejectReason::FloodGuard)
        );
    }

    #[test]
    fn test_consecutive_forced_events_respect_refractory() {
        let mut c = classifier();
        assert!(c.classify(&forced(1.0), &mut ACCEPT.clone()).accepted().is_some());
        assert_eq!(
            c.classify(&forced(1.05), &mut ACCEPT.clone()),
            Verdict::Rejected(RejectReason::Refractory)
        );
        assert!(c.classify(&forced(1.1), &mut ACCEPT.clone()).accepted().is_some());
    }

    #[test]
    fn test_strength_and_velocity_bounds() {
        assert_eq!(strength(0.0, 0.01), 0.0);
        assert_eq!(strength(1e9, 0.01), 1.0);
        assert_eq!(strength(1.0, 0.0), 0.0);
        assert!((strength(0.02, 0.01) - 0.5).abs() < 1e-12);
        for s in [-10.0, 0.0, 0.5, 1.0, 10.0, f64::NAN] {
            let v = velocity(s);
            assert!((1..=127).contains(&v));
        }
        assert_eq!(velocity(0.5), 76);
    }
}
