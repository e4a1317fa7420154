//! Error types for the simulator core.
//!
//! This module provides structured error types using `thiserror` for
//! library-level errors and integrates with `anyhow` for rich error context
//! at the operator command layer.

use thiserror::Error;

/// Errors surfaced by the simulator core and the operator command surface.
#[derive(Debug, Error)]
pub enum SimError {
    /// The server is already running on a port
    #[error("server already running on '{0}'")]
    AlreadyRunning(String),

    /// The server is not currently running
    #[error("server is not running")]
    NotRunning,

    /// Failed to open the serial port
    #[error("failed to open port '{port}': {source}")]
    OpenFailed {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// Slave id outside the addressable Modbus range
    #[error("slave id {0} is outside 1..=247")]
    InvalidSlaveId(u8),

    /// A device with this id already exists in the roster
    #[error("device {0} already exists")]
    DuplicateDevice(u8),

    /// No device with this id in the roster
    #[error("no such device: {0}")]
    UnknownDevice(u8),

    /// The core task is gone; the command channel is closed
    #[error("simulator core task is not reachable")]
    ChannelClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

// Allow anyhow errors to be converted to SimError
impl From<anyhow::Error> for SimError {
    fn from(err: anyhow::Error) -> Self {
        SimError::Other(format!("{:#}", err))
    }
}

/// Type alias for results of core operations
pub type SimResult<T> = Result<T, SimError>;
