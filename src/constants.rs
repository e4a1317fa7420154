//! Centralized constants for the simulator core.
//!
//! These values can be externalized to a config file in the future.

/// Serial port related constants.
pub mod serial {
    /// Size of the buffer for reading serial port data.
    pub const READ_BUFFER_SIZE: usize = 1024;

    /// Baud rate used when the operator does not specify one.
    pub const DEFAULT_BAUD_RATE: u32 = 9600;

    /// Default timeout for serial operations in milliseconds.
    pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
}

/// Channel capacity constants.
pub mod channels {
    /// Capacity of the operator command channel.
    pub const COMMAND_CAPACITY: usize = 32;

    /// Capacity of the broadcast event channel. Lagging subscribers lose
    /// the oldest events; events are advisory.
    pub const EVENT_CAPACITY: usize = 256;
}

/// Modbus protocol limits.
pub mod modbus {
    /// Lowest addressable slave id on a shared bus.
    pub const MIN_SLAVE_ID: u8 = 1;

    /// Highest addressable slave id on a shared bus.
    pub const MAX_SLAVE_ID: u8 = 247;

    /// Maximum register count for FC 03/04 reads.
    pub const MAX_READ_COUNT: u16 = 125;

    /// Maximum register count for FC 16 writes.
    pub const MAX_WRITE_COUNT: u16 = 123;
}

/// Frame parser tunables.
pub mod parser {
    /// The parser flushes its rolling buffer once it retains this many
    /// bytes without yielding a frame, bounding memory on a stuck stream.
    pub const MAX_PENDING_BYTES: usize = 4096;
}

/// Behavior engine tunables.
pub mod behavior {
    /// Period of the telemetry simulation tick in milliseconds.
    pub const TICK_PERIOD_MS: u64 = 1000;
}

/// Parameter protection and unlock handling.
pub mod unlock {
    /// Idle time after which an unlocked inverter re-locks, in milliseconds.
    pub const IDLE_TIMEOUT_MS: u128 = 5 * 60 * 1000;
}
