//! Error types
//!
//! Startup problems (bad configuration, unreadable replay files, MIDI ports
//! that cannot be opened) are fatal and travel as [`PhytoError`]. Failures on
//! the output side while running are [`SinkError`]s, which the scheduler logs
//! and drops.

use std::fmt;

#[derive(Debug)]
pub enum PhytoError {
    /// A configuration value violates a precondition
    InvalidConfig { field: &'static str, reason: String },
    /// Configuration text could not be parsed
    ConfigParse(String),
    /// IO error
    Io(std::io::Error),
    /// MIDI port could not be enumerated or opened
    Midi(String),
    /// Replay file line could not be understood
    Replay { line: usize, reason: String },
}

impl PhytoError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        PhytoError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PhytoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhytoError::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration value '{}': {}", field, reason)
            }
            PhytoError::ConfigParse(msg) => write!(f, "Failed to parse configuration: {}", msg),
            PhytoError::Io(e) => write!(f, "IO error: {}", e),
            PhytoError::Midi(msg) => write!(f, "MIDI error: {}", msg),
            PhytoError::Replay { line, reason } => {
                write!(f, "Replay file line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for PhytoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PhytoError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PhytoError {
    fn from(e: std::io::Error) -> Self {
        PhytoError::Io(e)
    }
}

impl From<toml::de::Error> for PhytoError {
    fn from(e: toml::de::Error) -> Self {
        PhytoError::ConfigParse(e.to_string())
    }
}

impl From<midir::InitError> for PhytoError {
    fn from(e: midir::InitError) -> Self {
        PhytoError::Midi(e.to_string())
    }
}

impl From<midir::PortInfoError> for PhytoError {
    fn from(e: midir::PortInfoError) -> Self {
        PhytoError::Midi(e.to_string())
    }
}

/// Result type for phytophon operations
pub type Result<T> = std::result::Result<T, PhytoError>;

/// A single send to the MIDI sink failed
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    /// The output port has gone away
    Disconnected,
    /// The backend rejected the message
    Send(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Disconnected => write!(f, "MIDI sink disconnected"),
            SinkError::Send(msg) => write!(f, "MIDI send failed: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<midir::SendError> for SinkError {
    fn from(e: midir::SendError) -> Self {
        SinkError::Send(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display_names_field() {
        let err = PhytoError::invalid("filter.voltage_alpha", "must be in (0, 1]");
        assert_eq!(
            err.to_string(),
            "Invalid configuration value 'filter.voltage_alpha': must be in (0, 1]"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PhytoError = io.into();
        assert!(matches!(err, PhytoError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_sink_error_display() {
        assert_eq!(SinkError::Disconnected.to_string(), "MIDI sink disconnected");
        assert_eq!(
            SinkError::Send("busy".to_string()).to_string(),
            "MIDI send failed: busy"
        );
    }
}
