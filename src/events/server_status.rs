//! Server lifecycle status, published on the watch channel and echoed on
//! the event stream whenever it flips.

/// Current state of the RTU server.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServerStatus {
    pub running: bool,
    /// Open port path while running
    pub port_name: Option<String>,
    /// Correlation id minted per `start`, carried in tracing spans
    pub session_id: Option<String>,
    pub bytes_read: u64,
    pub bytes_write: u64,
}
