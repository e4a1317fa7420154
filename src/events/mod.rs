//! Event definitions for the operator event stream.

pub mod log;
pub mod register;
pub mod server_status;

use crate::device::DeviceInfo;

/// Type-safe event name constants.
///
/// Transport glue forwarding [`SimEvent`]s to a GUI should use these
/// constants instead of string literals.
pub mod event_names {
    /// Emitted when the RTU server starts or stops.
    pub const SERVER_STATUS: &str = "server-status";

    /// Emitted when a device joins the roster.
    pub const DEVICE_ADDED: &str = "device-added";

    /// Emitted when a device leaves the roster.
    pub const DEVICE_REMOVED: &str = "device-removed";

    /// Emitted when a device's type, enable flag or sim mode changes.
    pub const DEVICE_UPDATED: &str = "device-updated";

    /// Emitted with a full roster snapshot after roster mutations.
    pub const DEVICES_LIST: &str = "devices-list";

    /// Emitted for every committed register write.
    pub const REGISTER_CHANGED: &str = "register-changed";

    /// Emitted for batched register writes (hooks, telemetry ticks).
    pub const REGISTERS_CHANGED: &str = "registers-changed";

    /// Emitted for operator console log lines.
    pub const LOG: &str = "log";
}

// Re-export event types for convenience
pub use log::{LogEvent, LogSeverity};
pub use register::{RegisterChanged, RegistersChanged};
pub use server_status::ServerStatus;

/// Everything the core pushes at its observers. Broadcast on a bounded
/// channel; slow subscribers lose the oldest events.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SimEvent {
    ServerStatus { running: bool },
    DeviceAdded(DeviceInfo),
    DeviceRemoved { id: u8 },
    DeviceUpdated(DeviceInfo),
    DevicesList(Vec<DeviceInfo>),
    RegisterChanged(RegisterChanged),
    RegistersChanged(RegistersChanged),
    Log(LogEvent),
}
