//! Phytophon CLI - plant bioelectric signal to MIDI

use clap::{Parser, Subcommand};
use phytophon::config::EngineConfig;
use phytophon::midi::{LogSink, MidiOutputSink, MidiSink};
use phytophon::notes::NoteEvent;
use phytophon::pipeline::Pipeline;
use phytophon::random::{RandomSource, SeededRandom};
use phytophon::runner::{run_offline, RunLimits, Runner};
use phytophon::sampler::{ReplaySampler, Sampler, SimulatedSampler, Timebase};
use phytophon::scheduler::NoteScheduler;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "phytophon")]
#[command(about = "Plant bioelectric signal to MIDI", long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sampling loop and send MIDI
    Run {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Connect to the first MIDI output whose name contains this
        #[arg(short, long)]
        device: Option<String>,

        /// Create a virtual MIDI port with this name
        #[arg(long = "virtual", conflicts_with = "device")]
        virtual_port: Option<String>,

        /// MIDI channel (0-15), overrides the configuration
        #[arg(long)]
        channel: Option<u8>,

        /// Replay readings from a file instead of simulating a plant
        #[arg(short, long)]
        replay: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(short = 'D', long)]
        duration: Option<f64>,

        /// Seed for gating, jitter and the simulated signal
        #[arg(short, long)]
        seed: Option<u64>,

        /// Log MIDI instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// List MIDI output ports
    List,

    /// Print the effective configuration as TOML
    Config {
        /// TOML configuration file to merge over the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the pipeline offline and print accepted events as JSON lines
    Analyze {
        /// Recorded readings; a simulated signal is used when omitted
        input: Option<PathBuf>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconds of simulated signal when no input is given
        #[arg(short = 'D', long, default_value = "60.0")]
        duration: f64,

        /// Seed for gating, jitter and the simulated signal
        #[arg(short, long, default_value = "1")]
        seed: u64,
    },
}

/// One accepted event, as printed by `analyze`
#[derive(Serialize)]
struct EventRecord<'a> {
    t: f64,
    voltage: f64,
    derivative: f64,
    threshold: f64,
    noise_floor: f64,
    forced: bool,
    notes: &'a [NoteEvent],
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::WARN
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = execute(cli.command) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn execute(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Run {
            config,
            device,
            virtual_port,
            channel,
            replay,
            duration,
            seed,
            dry_run,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(channel) = channel {
                config.midi.channel = channel;
            }
            if device.is_some() {
                config.midi.device = device;
            }
            if virtual_port.is_some() {
                config.midi.device = None;
                config.midi.virtual_port = virtual_port;
            }
            config.validate()?;

            let sink = open_sink(&config, dry_run)?;
            let scheduler =
                NoteScheduler::spawn(sink, config.midi.channel, config.midi.panic_on_connect);

            let mut sampler: Box<dyn Sampler> = match replay {
                Some(path) => {
                    info!("Replaying {}", path.display());
                    Box::new(ReplaySampler::open(
                        &path,
                        Timebase::ticks(config.tick_interval()),
                    )?)
                }
                None => {
                    info!("No input given; simulating a plant");
                    Box::new(SimulatedSampler::new(
                        seed.unwrap_or_else(rand::random),
                        Timebase::wall(),
                        config.sampling.reference_voltage,
                    ))
                }
            };

            let mut pipeline = Pipeline::new(&config, random_source(seed));
            let runner = Runner::new(&config);
            install_ctrl_c(runner.stop_handle());

            let limits = RunLimits {
                max_duration: duration
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .map(Duration::from_secs_f64),
                max_ticks: None,
            };

            info!("Plant MIDI running; press Ctrl+C to stop");
            let result = runner.run(sampler.as_mut(), &mut pipeline, &scheduler, limits);

            let stats = scheduler.shutdown();
            info!("MIDI sent: {}, dropped: {}", stats.sent, stats.dropped);
            result?;
        }

        Commands::List => {
            let devices = MidiOutputSink::list_devices()?;
            if devices.is_empty() {
                println!("No MIDI output ports found.");
                println!("Start a synth or use `phytophon run --virtual Plant_MIDI`.");
            } else {
                println!("Available MIDI outputs:");
                for (i, dev) in devices.iter().enumerate() {
                    println!("  [{}] {}", i, dev.name);
                }
            }
        }

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
        }

        Commands::Analyze {
            input,
            config,
            duration,
            seed,
        } => {
            let config = load_config(config.as_deref())?;
            let timebase = Timebase::ticks(config.tick_interval());

            let mut sampler: Box<dyn Sampler> = match input {
                Some(path) => Box::new(ReplaySampler::open(&path, timebase)?),
                None => Box::new(LimitedSampler {
                    inner: SimulatedSampler::new(seed, timebase, config.sampling.reference_voltage),
                    remaining: (duration.max(0.0) * config.sampling.rate_hz) as u64,
                }),
            };

            let mut pipeline = Pipeline::new(&config, Box::new(SeededRandom::new(seed)));
            let mut write_error = None;
            let summary = run_offline(sampler.as_mut(), &mut pipeline, |outcome| {
                if !outcome.is_accepted() || write_error.is_some() {
                    return;
                }
                let record = EventRecord {
                    t: outcome.t,
                    voltage: outcome.voltage,
                    derivative: outcome.derivative,
                    threshold: outcome.threshold,
                    noise_floor: outcome.noise_floor,
                    forced: outcome.forced,
                    notes: &outcome.notes,
                };
                match serde_json::to_string(&record) {
                    Ok(line) => println!("{}", line),
                    Err(e) => write_error = Some(e),
                }
            })?;
            if let Some(e) = write_error {
                return Err(e.into());
            }

            let seconds = summary.ticks as f64 * config.tick_interval();
            info!(
                "{} ticks ({:.1} s): {} events, {} notes ({:.2} notes/min)",
                summary.ticks,
                seconds,
                summary.events,
                summary.notes,
                if seconds > 0.0 {
                    summary.notes as f64 * 60.0 / seconds
                } else {
                    0.0
                }
            );
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> phytophon::Result<EngineConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            EngineConfig::load(path)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn open_sink(config: &EngineConfig, dry_run: bool) -> phytophon::Result<Box<dyn MidiSink>> {
    if dry_run {
        return Ok(Box::new(LogSink));
    }
    if let Some(device) = &config.midi.device {
        return Ok(Box::new(MidiOutputSink::connect(device)?));
    }
    if let Some(name) = &config.midi.virtual_port {
        return Ok(Box::new(MidiOutputSink::create_virtual(name)?));
    }
    Ok(Box::new(MidiOutputSink::connect_first()?))
}

fn random_source(seed: Option<u64>) -> Box<dyn RandomSource> {
    match seed {
        Some(seed) => Box::new(SeededRandom::new(seed)),
        None => Box::new(SeededRandom::from_entropy()),
    }
}

/// Raise `stop` on Ctrl+C
fn install_ctrl_c(stop: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("phytophon-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("Ctrl+C handler unavailable: {}", e);
                    return;
                }
            };
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                info!("Stopping");
                stop.store(true, Ordering::Relaxed);
            }
        });
    if let Err(e) = spawned {
        warn!("Ctrl+C handler unavailable: {}", e);
    }
}

/// Ends a never-ending sampler after a fixed number of readings
struct LimitedSampler<S: Sampler> {
    inner: S,
    remaining: u64,
}

impl<S: Sampler> Sampler for LimitedSampler<S> {
    fn next_sample(&mut self) -> phytophon::Result<Option<phytophon::sampler::Sample>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.inner.next_sample()
    }
}
