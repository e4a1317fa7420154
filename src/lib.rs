//! Multi-device Modbus RTU slave simulator.
//!
//! Impersonates a bank of field devices, inverters, electromagnetic flow
//! meters and three-phase energy meters, behind one RS-485 serial link so
//! Modbus master firmware can be exercised without hardware. The core is a
//! single tokio task owning the device roster, per-slave register memory
//! and the serial stream; operators drive it through [`Simulator`] and
//! observe it through a broadcast event stream.

pub mod constants;
pub mod device;
pub mod error;
pub mod events;
pub mod protocol;
pub mod serial;
pub mod sim;
pub mod storage;
pub mod util;

pub use device::{DeviceInfo, DeviceType, SimMode};
pub use error::{SimError, SimResult};
pub use events::{LogSeverity, ServerStatus, SimEvent};
pub use serial::LineSettings;
pub use sim::Simulator;
pub use storage::Storage;

use time::macros::format_description;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::time::OffsetTime;

/// Initialize tracing output: human-readable on stderr by default, daily
/// rolling JSON files when a log directory is given. Returns the appender
/// guard, which must be held for the process lifetime when file logging
/// is on.
pub fn setup_logging(log_dir: Option<&std::path::Path>) -> Option<WorkerGuard> {
    let fmt = if cfg!(debug_assertions) {
        format_description!("[hour]:[minute]:[second].[subsecond digits:3]")
    } else {
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]")
    };
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(offset, fmt);

    match log_dir {
        Some(dir) => {
            if !dir.exists() {
                std::fs::create_dir_all(dir).expect("failed to create log directory");
            }
            let (writer, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::RollingFileAppender::new(Rotation::DAILY, dir, "rs485-sim"),
            );
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_env_filter("rs485_sim")
                .with_timer(timer)
                .with_writer(writer)
                .json()
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_env_filter("rs485_sim")
                .with_timer(timer)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}
