//! Sampling loop
//!
//! Drives sampler → pipeline → scheduler at the configured tick rate. The
//! loop sleeps to absolute deadlines, so an overrunning tick shortens the
//! next sleep instead of pushing every later tick back.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::pipeline::{Pipeline, TickOutcome};
use crate::sampler::Sampler;
use crate::scheduler::NoteScheduler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Falling further behind than this drops the backlog instead of bursting
const MAX_LAG: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default)]
pub struct RunLimits {
    pub max_duration: Option<Duration>,
    pub max_ticks: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub events: u64,
    pub notes: u64,
    pub controls: u64,
    /// Ticks that started after their deadline had already passed by a full interval
    pub overruns: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        if outcome.is_accepted() {
            self.events += 1;
        }
        self.notes += outcome.notes.len() as u64;
        if outcome.control.is_some() {
            self.controls += 1;
        }
    }
}

pub struct Runner {
    interval: Duration,
    controller: u8,
    stop: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            interval: config.tick_duration(),
            controller: config.control.controller,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends the loop at the next tick boundary once set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run in real time until the sampler is exhausted, a limit is hit or
    /// the stop flag is raised.
    pub fn run(
        &self,
        sampler: &mut dyn Sampler,
        pipeline: &mut Pipeline,
        scheduler: &NoteScheduler,
        limits: RunLimits,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let start = Instant::now();
        let mut deadline = start;

        info!(
            "Sampling at {:.1} Hz",
            1.0 / self.interval.as_secs_f64()
        );

        while !self.stop.load(Ordering::Relaxed) {
            if limits.max_ticks.map_or(false, |max| summary.ticks >= max) {
                break;
            }
            if limits.max_duration.map_or(false, |max| start.elapsed() >= max) {
                break;
            }

            let now = Instant::now();
            if now < deadline {
                thread::sleep(deadline - now);
            } else if now - deadline > self.interval {
                summary.overruns += 1;
                debug!("Tick {} late by {:?}", summary.ticks, now - deadline);
            }

            let Some(sample) = sampler.next_sample()? else {
                info!("Sampler exhausted");
                break;
            };

            let outcome = pipeline.tick(sample);
            dispatch(&outcome, scheduler, self.controller);
            summary.record(&outcome);

            deadline += self.interval;
            let lag = Instant::now().saturating_duration_since(deadline);
            if lag > MAX_LAG {
                warn!("Sampling loop {:?} behind; skipping backlog", lag);
                deadline = Instant::now();
            }
        }

        info!(
            "Stopped after {} ticks: {} events, {} notes, {} control changes",
            summary.ticks, summary.events, summary.notes, summary.controls
        );
        Ok(summary)
    }
}

/// Hand one tick's output to the scheduler
pub fn dispatch(outcome: &TickOutcome, scheduler: &NoteScheduler, controller: u8) {
    if let Some(value) = outcome.control {
        scheduler.control(controller, value);
    }
    for note in &outcome.notes {
        scheduler.fire(note);
    }
}

/// Run the pipeline as fast as the sampler allows, without MIDI output.
/// `on_tick` sees every outcome.
pub fn run_offline(
    sampler: &mut dyn Sampler,
    pipeline: &mut Pipeline,
    mut on_tick: impl FnMut(&TickOutcome),
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    while let Some(sample) = sampler.next_sample()? {
        let outcome = pipeline.tick(sample);
        on_tick(&outcome);
        summary.record(&outcome);
    }
    Ok(summary)
}
