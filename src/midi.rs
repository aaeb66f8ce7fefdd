//! MIDI messages and output sinks
//!
//! The scheduler thread owns exactly one [`MidiSink`]. Every send is fire and
//! forget: a failing sink returns a [`SinkError`], which the caller logs and
//! drops.

use crate::error::{PhytoError, Result, SinkError};
use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

const CLIENT_NAME: &str = "Phytophon";
const CONNECTION_NAME: &str = "phytophon-output";

/// Channel voice messages the engine produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
}

/// Controller 120
pub const ALL_SOUND_OFF: u8 = 120;
/// Controller 123
pub const ALL_NOTES_OFF: u8 = 123;

impl MidiMessage {
    /// Convert to raw MIDI bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff { channel, note } => [0x80 | (channel & 0x0F), note & 0x7F, 0],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
        }
    }

    /// All Sound Off followed by All Notes Off on every channel
    pub fn panic_sequence() -> Vec<MidiMessage> {
        (0..16)
            .flat_map(|channel| {
                [ALL_SOUND_OFF, ALL_NOTES_OFF].map(|controller| MidiMessage::ControlChange {
                    channel,
                    controller,
                    value: 0,
                })
            })
            .collect()
    }
}

/// Destination for outgoing messages
pub trait MidiSink: Send {
    fn send(&mut self, msg: &MidiMessage) -> std::result::Result<(), SinkError>;

    /// Human-readable name for logs
    fn name(&self) -> &str;
}

/// MIDI output port info
pub struct MidiDevice {
    pub name: String,
    pub port: MidiOutputPort,
}

/// Sink backed by a midir output connection
pub struct MidiOutputSink {
    connection: MidiOutputConnection,
    name: String,
}

impl MidiOutputSink {
    /// List available MIDI output ports
    pub fn list_devices() -> Result<Vec<MidiDevice>> {
        let midi_out = MidiOutput::new("Phytophon MIDI Scanner")?;
        let mut devices = Vec::new();
        for port in midi_out.ports() {
            let name = midi_out.port_name(&port)?;
            devices.push(MidiDevice { name, port });
        }
        Ok(devices)
    }

    /// Connect to the first port whose name contains `device_name`
    pub fn connect(device_name: &str) -> Result<Self> {
        let device = Self::list_devices()?
            .into_iter()
            .find(|d| d.name.contains(device_name))
            .ok_or_else(|| PhytoError::Midi(format!("MIDI device '{}' not found", device_name)))?;
        Self::connect_to_port(device)
    }

    /// Connect to whichever port is listed first
    pub fn connect_first() -> Result<Self> {
        let device = Self::list_devices()?
            .into_iter()
            .next()
            .ok_or_else(|| PhytoError::Midi("no MIDI output ports available".to_string()))?;
        Self::connect_to_port(device)
    }

    pub fn connect_to_port(device: MidiDevice) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let connection = midi_out
            .connect(&device.port, CONNECTION_NAME)
            .map_err(|e| PhytoError::Midi(e.to_string()))?;
        info!("Connected to MIDI output '{}'", device.name);
        Ok(Self {
            connection,
            name: device.name,
        })
    }

    /// Create a virtual output port other applications can subscribe to
    #[cfg(unix)]
    pub fn create_virtual(port_name: &str) -> Result<Self> {
        use midir::os::unix::VirtualOutput;

        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let connection = midi_out
            .create_virtual(port_name)
            .map_err(|e| PhytoError::Midi(e.to_string()))?;
        info!("Created virtual MIDI port '{}'", port_name);
        Ok(Self {
            connection,
            name: port_name.to_string(),
        })
    }

    #[cfg(not(unix))]
    pub fn create_virtual(port_name: &str) -> Result<Self> {
        Err(PhytoError::Midi(format!(
            "virtual port '{}' requested, but virtual ports are not supported on this platform",
            port_name
        )))
    }
}

impl MidiSink for MidiOutputSink {
    fn send(&mut self, msg: &MidiMessage) -> std::result::Result<(), SinkError> {
        self.connection.send(&msg.to_bytes())?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Logs messages instead of sending them
#[derive(Debug, Default)]
pub struct LogSink;

impl MidiSink for LogSink {
    fn send(&mut self, msg: &MidiMessage) -> std::result::Result<(), SinkError> {
        info!(?msg, "midi");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Shared log of everything a [`RecordingSink`] received
pub type Recording = Arc<Mutex<Vec<(Instant, MidiMessage)>>>;

/// Keeps every message with its send time. Can be told to fail, to exercise
/// the drop-on-failure path.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Recording,
    failing: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose sends all fail
    pub fn failing() -> Self {
        Self {
            log: Recording::default(),
            failing: true,
        }
    }

    pub fn recording(&self) -> Recording {
        self.log.clone()
    }

    pub fn messages(&self) -> Vec<MidiMessage> {
        self.log
            .lock()
            .map(|log| log.iter().map(|(_, m)| *m).collect())
            .unwrap_or_default()
    }
}

impl MidiSink for RecordingSink {
    fn send(&mut self, msg: &MidiMessage) -> std::result::Result<(), SinkError> {
        if self.failing {
            return Err(SinkError::Disconnected);
        }
        if let Ok(mut log) = self.log.lock() {
            log.push((Instant::now(), *msg));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
