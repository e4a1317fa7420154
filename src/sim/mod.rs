//! The simulator: public operator handle and the core task behind it.

pub(crate) mod core;
mod dispatcher;
pub mod helpers;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::constants::{channels, serial as serial_consts};
use crate::device::{DeviceInfo, DeviceType, SimMode};
use crate::error::SimResult;
use crate::events::{ServerStatus, SimEvent};
use crate::serial::LineSettings;
use crate::storage::Storage;
use crate::util::Reply;

/// Operator commands serialised into the core task. Every command carries
/// a one-shot reply sender.
pub(crate) enum Command {
    Start {
        port_name: String,
        baud_rate: u32,
        line: LineSettings,
        reply: Reply<SimResult<String>>,
    },
    Stop {
        reply: Reply<SimResult<()>>,
    },
    AddDevice {
        id: u8,
        device_type: DeviceType,
        reply: Reply<SimResult<()>>,
    },
    RemoveDevice {
        id: u8,
        reply: Reply<SimResult<()>>,
    },
    SetType {
        id: u8,
        device_type: DeviceType,
        reply: Reply<SimResult<()>>,
    },
    SetEnabled {
        id: u8,
        enabled: bool,
        reply: Reply<SimResult<()>>,
    },
    SetSimMode {
        id: u8,
        sim_mode: SimMode,
        reply: Reply<SimResult<()>>,
    },
    SetRegister {
        id: u8,
        addr: u16,
        value: u16,
        reply: Reply<SimResult<()>>,
    },
    GetRegister {
        id: u8,
        addr: u16,
        reply: Reply<SimResult<u16>>,
    },
    ListDevices {
        reply: Reply<Vec<DeviceInfo>>,
    },
    GetDeviceState {
        id: u8,
        reply: Reply<SimResult<DeviceInfo>>,
    },
}

/// Handle to a running simulator core.
///
/// Cheap to hand around by reference; dropping the handle cancels the core
/// task, which closes the port and discards any in-flight frame assembly.
/// Persisted state is reloaded on the next spawn.
#[derive(Debug)]
pub struct Simulator {
    command_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<SimEvent>,
    status_rx: watch::Receiver<ServerStatus>,
    cancel: CancellationToken,
}

impl Simulator {
    /// Spawn the core task. Roster and register memory restore from
    /// `storage` before the first command is processed.
    pub fn spawn(storage: Storage) -> Self {
        let (command_tx, command_rx) = mpsc::channel(channels::COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(channels::EVENT_CAPACITY);
        let (status_tx, status_rx) = watch::channel(ServerStatus::default());
        let cancel = CancellationToken::new();

        let core = core::SimCore::new(storage, event_tx.clone(), status_tx);
        tokio::spawn(core::run(core, command_rx, cancel.clone()));

        Self {
            command_tx,
            event_tx,
            status_rx,
            cancel,
        }
    }

    /// Open the serial port and start answering masters. Returns the
    /// session id minted for this run.
    pub async fn start(&self, port_name: impl Into<String>, baud_rate: u32) -> SimResult<String> {
        self.start_with_line(port_name, baud_rate, LineSettings::default())
            .await
    }

    /// [`start`](Self::start) with explicit line parameters for masters
    /// that do not run 8N1.
    pub async fn start_with_line(
        &self,
        port_name: impl Into<String>,
        baud_rate: u32,
        line: LineSettings,
    ) -> SimResult<String> {
        let port_name = port_name.into();
        let baud_rate = if baud_rate == 0 {
            serial_consts::DEFAULT_BAUD_RATE
        } else {
            baud_rate
        };
        helpers::send_command(&self.command_tx, |reply| Command::Start {
            port_name,
            baud_rate,
            line,
            reply,
        })
        .await?
    }

    /// Close the serial port; the roster and memory stay live.
    pub async fn stop(&self) -> SimResult<()> {
        helpers::send_command(&self.command_tx, |reply| Command::Stop { reply }).await?
    }

    pub async fn add_device(&self, id: u8, device_type: DeviceType) -> SimResult<()> {
        helpers::send_command(&self.command_tx, |reply| Command::AddDevice {
            id,
            device_type,
            reply,
        })
        .await?
    }

    pub async fn remove_device(&self, id: u8) -> SimResult<()> {
        helpers::send_command(&self.command_tx, |reply| Command::RemoveDevice { id, reply })
            .await?
    }

    pub async fn set_type(&self, id: u8, device_type: DeviceType) -> SimResult<()> {
        helpers::send_command(&self.command_tx, |reply| Command::SetType {
            id,
            device_type,
            reply,
        })
        .await?
    }

    pub async fn set_enabled(&self, id: u8, enabled: bool) -> SimResult<()> {
        helpers::send_command(&self.command_tx, |reply| Command::SetEnabled {
            id,
            enabled,
            reply,
        })
        .await?
    }

    pub async fn set_sim_mode(&self, id: u8, sim_mode: SimMode) -> SimResult<()> {
        helpers::send_command(&self.command_tx, |reply| Command::SetSimMode {
            id,
            sim_mode,
            reply,
        })
        .await?
    }

    /// Operator register write: unvalidated, but persisted and reported.
    pub async fn set_register(&self, id: u8, addr: u16, value: u16) -> SimResult<()> {
        helpers::send_command(&self.command_tx, |reply| Command::SetRegister {
            id,
            addr,
            value,
            reply,
        })
        .await?
    }

    pub async fn get_register(&self, id: u8, addr: u16) -> SimResult<u16> {
        helpers::send_command(&self.command_tx, |reply| Command::GetRegister {
            id,
            addr,
            reply,
        })
        .await?
    }

    pub async fn list_devices(&self) -> SimResult<Vec<DeviceInfo>> {
        helpers::send_command(&self.command_tx, |reply| Command::ListDevices { reply }).await
    }

    pub async fn get_device_state(&self, id: u8) -> SimResult<DeviceInfo> {
        helpers::send_command(&self.command_tx, |reply| Command::GetDeviceState { id, reply })
            .await?
    }

    /// Subscribe to the operator event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.event_tx.subscribe()
    }

    /// Current server status; the receiver updates as the core runs.
    pub fn status(&self) -> watch::Receiver<ServerStatus> {
        self.status_rx.clone()
    }

    /// Server status as an async stream, for consumers that prefer
    /// `Stream` combinators over watch semantics.
    pub fn status_stream(&self) -> WatchStream<ServerStatus> {
        WatchStream::new(self.status_rx.clone())
    }

    /// Stop the core task outright. Equivalent to dropping the handle.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
