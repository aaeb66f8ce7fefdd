//! # Phytophon - Plant Signal to MIDI
//!
//! Phytophon listens to the bioelectric potential of a plant, sampled through
//! an ADC, and turns it into MIDI: a continuous controller that follows the
//! slow state of the signal, and notes that mark sudden or accumulated change.
//!
//! ## Signal Flow
//!
//! ```text
//! Sampler -> Filter -> { Threshold, Drift } -> Classifier -> Notes -> Scheduler -> MIDI
//!               \-> Continuous control ----------------------------/
//! ```
//!
//! - **Filter**: exponential smoothing of voltage and of its derivative
//! - **Threshold**: adaptive noise floor; the trigger threshold scales with it
//! - **Drift**: integrates change so slow trends still produce notes
//! - **Classifier**: sign-change and strength heuristics, refractory and flood
//!   guards, probabilistic gating
//! - **Scheduler**: note-on now, note-off later, on its own thread
//!
//! No scale or harmony is applied; pitch reflects absolute electrical state
//! and velocity reflects the intensity of change.
//!
//! ## Quick Start
//!
//! ```rust
//! use phytophon::config::EngineConfig;
//! use phytophon::pipeline::Pipeline;
//! use phytophon::random::SeededRandom;
//! use phytophon::sampler::Sample;
//!
//! let config = EngineConfig::default();
//! let mut pipeline = Pipeline::new(&config, Box::new(SeededRandom::new(1)));
//!
//! let outcome = pipeline.tick(Sample { voltage: 1.65, t: 0.0 });
//! assert_eq!(outcome.control, Some(63));
//! assert!(outcome.notes.is_empty());
//! ```

pub mod classifier;
pub mod config;
pub mod control;
pub mod drift;
pub mod error;
pub mod filter;
pub mod midi;
pub mod notes;
pub mod pipeline;
pub mod random;
pub mod runner;
pub mod sampler;
pub mod scheduler;
pub mod threshold;

pub use config::EngineConfig;
pub use error::{PhytoError, Result};
pub use pipeline::{Pipeline, TickOutcome};
