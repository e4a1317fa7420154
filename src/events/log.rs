//! Log events pushed to the operator console.

use std::fmt;

use crate::sim::helpers::timestamp_now_ms;

/// Severity of an operator log line. `Rx`/`Tx` carry hex dumps of bus
/// traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warn,
    Err,
    Rx,
    Tx,
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Err => "err",
            Self::Rx => "rx",
            Self::Tx => "tx",
        };
        f.write_str(s)
    }
}

/// Payload for operator log events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogEvent {
    pub severity: LogSeverity,
    pub text: String,
    /// Timestamp in milliseconds since the Unix epoch
    pub timestamp_ms: u128,
}

impl LogEvent {
    pub fn new(severity: LogSeverity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
            timestamp_ms: timestamp_now_ms(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(LogSeverity::Info, text)
    }

    pub fn warn(text: impl Into<String>) -> Self {
        Self::new(LogSeverity::Warn, text)
    }

    pub fn err(text: impl Into<String>) -> Self {
        Self::new(LogSeverity::Err, text)
    }

    /// Hex dump of bytes received from the bus.
    pub fn rx(data: &[u8]) -> Self {
        Self::new(LogSeverity::Rx, hex::encode_upper(data))
    }

    /// Hex dump of a response handed to the serial driver.
    pub fn tx(data: &[u8]) -> Self {
        Self::new(LogSeverity::Tx, hex::encode_upper(data))
    }
}
