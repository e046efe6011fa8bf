//! Error types for cdpsweep.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for cdpsweep operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH/Telnet transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Per-device session failures
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Script usage errors
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Device list errors
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Settings store errors
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// I/O error outside the transport (output files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Transport layer errors (SSH/Telnet connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host not in known_hosts while strict checking is on
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (prompt waits).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Pattern matching timed out
    #[error("Pattern not found within {0:?}")]
    PatternTimeout(std::time::Duration),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,
}

/// The two recoverable per-device failure kinds.
///
/// Both carry a human-readable message that ends up verbatim in the
/// failure log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Could not establish the transport or authenticate.
    #[error("{message}")]
    Connect { message: String },

    /// Connected, but the interaction that followed misbehaved.
    #[error("{message}")]
    Interaction { message: String },
}

impl SessionError {
    /// Build a connect failure.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Build an interaction failure.
    pub fn interaction(message: impl Into<String>) -> Self {
        Self::Interaction {
            message: message.into(),
        }
    }

    /// The message carried by either kind.
    pub fn message(&self) -> &str {
        match self {
            Self::Connect { message } | Self::Interaction { message } => message,
        }
    }
}

/// Script usage errors. These abort the batch.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// The runner was started on a connected session
    #[error("This script must be launched from a session that is not connected")]
    AlreadyConnected,

    /// The operator left a required value empty
    #[error("No value supplied for {field}")]
    MissingInput { field: String },

    /// Reading operator input failed or was cancelled
    #[error("Prompt failed: {0}")]
    Prompt(String),
}

/// Device list errors.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// The CSV could not be parsed
    #[error("Failed to read device list {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A row names a protocol other than SSH or Telnet
    #[error("Unsupported protocol '{0}'")]
    UnknownProtocol(String),
}

/// Settings store errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Reading or writing the settings file failed
    #[error("Settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings file is not valid TOML for this schema
    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The settings could not be serialized
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type alias using cdpsweep's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for operations that fail per device.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_message_is_verbatim() {
        let err = SessionError::connect("Authentication failed for user 'admin'");
        assert_eq!(err.to_string(), "Authentication failed for user 'admin'");
        assert_eq!(err.message(), "Authentication failed for user 'admin'");

        let err: Error = SessionError::interaction("timed out").into();
        assert_eq!(err.to_string(), "timed out");
    }

    #[test]
    fn test_channel_errors_keep_their_layer() {
        let timeout: Error = ChannelError::PatternTimeout(std::time::Duration::from_secs(2)).into();
        assert_eq!(timeout.to_string(), "Channel error: Pattern not found within 2s");

        let closed: Error = ChannelError::Closed.into();
        assert!(matches!(closed, Error::Channel(ChannelError::Closed)));
    }
}
