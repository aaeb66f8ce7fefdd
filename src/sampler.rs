//! Voltage sources
//!
//! The pipeline only needs timestamped voltage readings. Hardware ADC access
//! stays outside this crate; what lives here are the sources that run
//! without hardware: a synthetic plant signal and replay of recorded
//! readings.

use crate::error::{PhytoError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::time::Instant;

/// One voltage reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub voltage: f64,
    /// Seconds since the session started
    pub t: f64,
}

/// Source of voltage readings, polled once per tick
pub trait Sampler {
    /// Next raw (unsmoothed) reading, or `None` once the source is exhausted
    fn next_sample(&mut self) -> Result<Option<Sample>>;
}

/// Where sample timestamps come from
#[derive(Debug, Clone, Copy)]
pub enum Timebase {
    /// Wall-clock seconds since `start`
    Wall(Instant),
    /// `index * interval`, for offline runs that should not depend on real time
    Ticks { interval: f64, index: u64 },
}

impl Timebase {
    pub fn wall() -> Self {
        Timebase::Wall(Instant::now())
    }

    pub fn ticks(interval: f64) -> Self {
        Timebase::Ticks { interval, index: 0 }
    }

    pub fn stamp(&mut self) -> f64 {
        match self {
            Timebase::Wall(start) => start.elapsed().as_secs_f64(),
            Timebase::Ticks { interval, index } => {
                let t = *index as f64 * *interval;
                *index += 1;
                t
            }
        }
    }
}

/// Synthetic bioelectric signal: a slow bounded wander around a baseline,
/// measurement noise, and occasional spikes that decay over a few hundred
/// milliseconds.
pub struct SimulatedSampler {
    rng: StdRng,
    timebase: Timebase,
    baseline: f64,
    wander: f64,
    spike: f64,
    /// Per-tick probability of a new spike
    spike_chance: f64,
    /// Per-tick spike decay factor
    spike_decay: f64,
    noise: f64,
    reference_voltage: f64,
}

impl SimulatedSampler {
    pub fn new(seed: u64, timebase: Timebase, reference_voltage: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            timebase,
            baseline: reference_voltage / 2.0,
            wander: 0.0,
            spike: 0.0,
            spike_chance: 0.004,
            spike_decay: 0.9,
            noise: 0.002,
            reference_voltage,
        }
    }

    pub fn with_spike_chance(mut self, chance: f64) -> Self {
        self.spike_chance = chance.clamp(0.0, 1.0);
        self
    }

    fn next_voltage(&mut self) -> f64 {
        // Mean-reverting random walk
        self.wander += self.rng.gen_range(-0.004f64..0.004) - self.wander * 0.002;

        self.spike *= self.spike_decay;
        if self.rng.gen::<f64>() < self.spike_chance {
            let sign = if self.rng.gen::<bool>() { 1.0 } else { -1.0 };
            self.spike += sign * self.rng.gen_range(0.05..0.4);
        }

        // Sum of uniforms approximates a gaussian
        let noise: f64 = (0..4).map(|_| self.rng.gen_range(-1.0f64..1.0)).sum::<f64>() * 0.5;

        (self.baseline + self.wander + self.spike + noise * self.noise)
            .clamp(0.0, self.reference_voltage)
    }
}

impl Sampler for SimulatedSampler {
    fn next_sample(&mut self) -> Result<Option<Sample>> {
        let voltage = self.next_voltage();
        Ok(Some(Sample {
            voltage,
            t: self.timebase.stamp(),
        }))
    }
}

/// Replays recorded readings, one per line.
///
/// A line is either a bare voltage or `t,voltage` (comma or whitespace
/// separated). Blank lines and lines starting with `#` are skipped. Bare
/// voltages are stamped from the timebase.
pub struct ReplaySampler<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
    timebase: Timebase,
}

impl ReplaySampler<BufReader<File>> {
    pub fn open(path: &Path, timebase: Timebase) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file), timebase))
    }
}

impl<R: BufRead> ReplaySampler<R> {
    pub fn from_reader(reader: R, timebase: Timebase) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            timebase,
        }
    }

    fn parse_line(&mut self, line: &str) -> Result<Sample> {
        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();

        let line_no = self.line_no;
        let number = |field: &str, what: &str| -> Result<f64> {
            match field.parse::<f64>() {
                Ok(x) if x.is_finite() => Ok(x),
                Ok(_) => Err(PhytoError::Replay {
                    line: line_no,
                    reason: format!("'{}' is not a finite {}", field, what),
                }),
                Err(_) => Err(PhytoError::Replay {
                    line: line_no,
                    reason: format!("'{}' is not a number", field),
                }),
            }
        };

        match fields.as_slice() {
            [v] => {
                let voltage = number(v, "voltage")?;
                Ok(Sample {
                    voltage,
                    t: self.timebase.stamp(),
                })
            }
            [t, v] => Ok(Sample {
                t: number(t, "timestamp")?,
                voltage: number(v, "voltage")?,
            }),
            _ => Err(PhytoError::Replay {
                line: line_no,
                reason: format!("expected 1 or 2 fields, found {}", fields.len()),
            }),
        }
    }
}

impl<R: BufRead> Sampler for ReplaySampler<R> {
    fn next_sample(&mut self) -> Result<Option<Sample>> {
        while let Some(line) = self.lines.next() {
            let line = line?;
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return self.parse_line(trimmed).map(Some);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn replay(text: &str) -> ReplaySampler<Cursor<Vec<u8>>> {
        ReplaySampler::from_reader(Cursor::new(text.as_bytes().to_vec()), Timebase::ticks(0.025))
    }

    #[test]
    fn test_tick_timebase_counts_up() {
        let mut tb = Timebase::ticks(0.5);
        assert_eq!(tb.stamp(), 0.0);
        assert_eq!(tb.stamp(), 0.5);
        assert_eq!(tb.stamp(), 1.0);
    }

    #[test]
    fn test_replay_bare_voltages() {
        let mut s = replay("# header\n1.0\n\n1.5\n");
        assert_eq!(s.next_sample().unwrap(), Some(Sample { voltage: 1.0, t: 0.0 }));
        assert_eq!(s.next_sample().unwrap(), Some(Sample { voltage: 1.5, t: 0.025 }));
        assert_eq!(s.next_sample().unwrap(), None);
    }

    #[test]
    fn test_replay_timestamped_rows() {
        let mut s = replay("0.10, 1.2\n0.20 1.3\n");
        assert_eq!(s.next_sample().unwrap(), Some(Sample { voltage: 1.2, t: 0.10 }));
        assert_eq!(s.next_sample().unwrap(), Some(Sample { voltage: 1.3, t: 0.20 }));
    }

    #[test]
    fn test_replay_reports_bad_line() {
        let mut s = replay("1.0\nabc\n");
        s.next_sample().unwrap();
        match s.next_sample() {
            Err(PhytoError::Replay { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected replay error, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_rejects_non_finite_values() {
        for text in ["nan\n", "inf\n", "-inf\n", "0.1, NaN\n", "inf, 1.0\n"] {
            let mut s = replay(text);
            match s.next_sample() {
                Err(PhytoError::Replay { line, reason }) => {
                    assert_eq!(line, 1);
                    assert!(reason.contains("is not a finite"), "{}", reason);
                }
                other => panic!("{:?} should be rejected, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_replay_rejects_too_many_fields() {
        let mut s = replay("1,2,3\n");
        assert!(s.next_sample().is_err());
    }

    #[test]
    fn test_simulated_stays_in_range_and_is_seeded() {
        let mut a = SimulatedSampler::new(3, Timebase::ticks(0.025), 3.3).with_spike_chance(0.2);
        let mut b = SimulatedSampler::new(3, Timebase::ticks(0.025), 3.3).with_spike_chance(0.2);
        for _ in 0..2000 {
            let x = a.next_sample().unwrap().unwrap();
            let y = b.next_sample().unwrap().unwrap();
            assert_eq!(x, y);
            assert!((0.0..=3.3).contains(&x.voltage));
        }
    }
}
