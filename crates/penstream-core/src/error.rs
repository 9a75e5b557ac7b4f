//! Error handling for penstream
//!
//! Provides the error types for every layer of the streaming engine:
//! - Connect errors (the serial port could not be opened or prepared)
//! - Load errors (a program could not be turned into a session)
//! - Controller errors (requests issued against a stopped engine)
//!
//! Protocol noise and watchdog recoveries are deliberately *not* errors:
//! they are logged and surfaced as events, and never abort the engine.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Raised only while bringing a link up. Once a link is open, I/O failures
/// degrade it to the disconnected state instead of producing an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// The reset handshake could not be written to the device
    #[error("Handshake with {port} failed: {reason}")]
    HandshakeFailed {
        /// The port the handshake was attempted on.
        port: String,
        /// The underlying I/O failure.
        reason: String,
    },
}

/// Program load error type
///
/// No session is started when loading fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The program file could not be read
    #[error("Failed to read program {path}: {reason}")]
    Unreadable {
        /// Path of the program file.
        path: String,
        /// The reason the file could not be read.
        reason: String,
    },

    /// Nothing was left after stripping comments and blank lines
    #[error("Program contains no commands")]
    EmptyProgram,

    /// There is no engine to hand the program to
    #[error("Controller not connected")]
    NotConnected,
}

/// Controller error type
///
/// Represents requests that could not be delivered to the streaming engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Controller is not connected
    #[error("Controller not connected")]
    NotConnected,

    /// Controller is already connected
    #[error("Controller already connected")]
    AlreadyConnected,

    /// The engine task has stopped and no longer accepts requests
    #[error("Streaming engine stopped")]
    EngineStopped,

    /// Command text that cannot be sent as a single line
    #[error("Invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected.
        reason: String,
    },
}

/// Main error type for penstream
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connect error
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Load error
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connect error
    pub fn is_connect_error(&self) -> bool {
        matches!(self, Error::Connect(_))
    }

    /// Check if this is a load error
    pub fn is_load_error(&self) -> bool {
        matches!(self, Error::Load(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let err = ConnectError::FailedToOpen {
            port: "/dev/ttyUSB0".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to open port /dev/ttyUSB0: No such file or directory"
        );
    }

    #[test]
    fn test_error_conversions() {
        let err: Error = LoadError::EmptyProgram.into();
        assert!(err.is_load_error());
        assert!(!err.is_connect_error());

        let err: Error = ControllerError::NotConnected.into();
        assert!(err.is_controller_error());
        assert_eq!(err.to_string(), "Controller not connected");
    }
}
