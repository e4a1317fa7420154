//! The single-context core task.
//!
//! One spawned task owns the registry, the register bank, the frame parser
//! and the serial stream. Its `select!` loop serialises operator commands,
//! serial traffic and the behavior tick, which is what makes every
//! dispatcher guarantee single-threaded: order of arrival is order of
//! processing, and nothing else can touch the bank in between.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::constants::{behavior as behavior_consts, serial as serial_consts};
use crate::device::{behavior, DeviceRegistry, RegisterBank, SimMode};
use crate::error::{SimError, SimResult};
use crate::events::{LogEvent, RegisterChanged, RegistersChanged, ServerStatus, SimEvent};
use crate::protocol::parser::FrameParser;
use crate::serial::LineSettings;
use crate::sim::Command;
use crate::storage::{PersistedState, RegisterSnapshot, RosterEntry, Storage};

pub(crate) struct SimCore {
    pub(crate) registry: DeviceRegistry,
    pub(crate) bank: RegisterBank,
    pub(crate) parser: FrameParser,
    pub(crate) storage: Storage,
    pub(crate) event_tx: broadcast::Sender<SimEvent>,
    pub(crate) status_tx: watch::Sender<ServerStatus>,
    pub(crate) port: Option<tokio_serial::SerialStream>,
}

impl SimCore {
    pub(crate) fn new(
        storage: Storage,
        event_tx: broadcast::Sender<SimEvent>,
        status_tx: watch::Sender<ServerStatus>,
    ) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            bank: RegisterBank::new(),
            parser: FrameParser::new(),
            storage,
            event_tx,
            status_tx,
            port: None,
        }
    }

    pub(crate) fn emit(&self, event: SimEvent) {
        // no subscribers is not an error
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn emit_log(&self, event: LogEvent) {
        self.emit(SimEvent::Log(event));
    }

    /// Rebuild roster and memory from persisted state.
    pub(crate) fn restore(&mut self, persisted: PersistedState) {
        for (id, entry) in &persisted.roster {
            if let Err(err) = self.registry.add(*id, entry.device_type) {
                tracing::warn!(id, "skipping persisted device: {err}");
                continue;
            }
            if let Ok(device) = self.registry.get_mut(*id) {
                device.enabled = entry.enabled;
                device.sim_mode = entry.sim_mode;
            }
            self.bank.create(*id, entry.device_type);
            if let Some(snapshot) = persisted.registers.get(id) {
                for (addr, value) in snapshot {
                    self.bank.write(*id, *addr, *value);
                }
            }
        }
        tracing::info!(devices = persisted.roster.len(), "roster restored");
        self.emit(SimEvent::DevicesList(self.registry.list()));
    }

    fn roster_snapshot(&self) -> BTreeMap<u8, RosterEntry> {
        self.registry
            .iter()
            .map(|(id, device)| {
                (
                    id,
                    RosterEntry {
                        device_type: device.device_type,
                        enabled: device.enabled,
                        sim_mode: device.sim_mode,
                    },
                )
            })
            .collect()
    }

    fn registers_snapshot(&self) -> BTreeMap<u8, RegisterSnapshot> {
        self.registry
            .iter()
            .map(|(id, _)| (id, self.bank.non_zero(id)))
            .collect()
    }

    async fn persist_roster(&self) {
        if let Err(err) = self.storage.save_roster(&self.roster_snapshot()).await {
            tracing::error!("roster flush failed: {err}");
            self.emit_log(LogEvent::err(format!("roster flush failed: {err}")));
        }
    }

    async fn persist_registers(&self) {
        if let Err(err) = self
            .storage
            .save_registers(&self.registers_snapshot())
            .await
        {
            tracing::error!("register flush failed: {err}");
            self.emit_log(LogEvent::err(format!("register flush failed: {err}")));
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                port_name,
                baud_rate,
                line,
                reply,
            } => {
                let _ = reply.send(self.open_port(port_name, baud_rate, line));
            }
            Command::Stop { reply } => {
                let result = if self.port.is_some() {
                    self.close_port("operator stop");
                    Ok(())
                } else {
                    Err(SimError::NotRunning)
                };
                let _ = reply.send(result);
            }
            Command::AddDevice {
                id,
                device_type,
                reply,
            } => {
                let result = self.registry.add(id, device_type);
                if result.is_ok() {
                    self.bank.create(id, device_type);
                    if let Ok(info) = self.registry.info(id) {
                        self.emit(SimEvent::DeviceAdded(info));
                    }
                    self.emit(SimEvent::DevicesList(self.registry.list()));
                    self.persist_roster().await;
                }
                let _ = reply.send(result);
            }
            Command::RemoveDevice { id, reply } => {
                let result = self.registry.remove(id).map(|_| ());
                if result.is_ok() {
                    self.bank.remove(id);
                    self.emit(SimEvent::DeviceRemoved { id });
                    self.emit(SimEvent::DevicesList(self.registry.list()));
                    self.persist_roster().await;
                    self.persist_registers().await;
                }
                let _ = reply.send(result);
            }
            Command::SetType {
                id,
                device_type,
                reply,
            } => {
                let result = self.registry.set_type(id, device_type);
                if result.is_ok() {
                    // type change recreates memory with the new defaults
                    self.bank.create(id, device_type);
                    if let Ok(info) = self.registry.info(id) {
                        self.emit(SimEvent::DeviceUpdated(info));
                    }
                    self.emit(SimEvent::DevicesList(self.registry.list()));
                    self.persist_roster().await;
                    self.persist_registers().await;
                }
                let _ = reply.send(result);
            }
            Command::SetEnabled { id, enabled, reply } => {
                let result = self.registry.set_enabled(id, enabled);
                if result.is_ok() {
                    if let Ok(info) = self.registry.info(id) {
                        self.emit(SimEvent::DeviceUpdated(info));
                    }
                    self.persist_roster().await;
                }
                let _ = reply.send(result);
            }
            Command::SetSimMode { id, sim_mode, reply } => {
                let result = self.registry.set_sim_mode(id, sim_mode);
                if result.is_ok() {
                    if let Ok(info) = self.registry.info(id) {
                        self.emit(SimEvent::DeviceUpdated(info));
                    }
                    self.persist_roster().await;
                }
                let _ = reply.send(result);
            }
            Command::SetRegister {
                id,
                addr,
                value,
                reply,
            } => {
                let result = if self.registry.contains(id) {
                    self.bank.write(id, addr, value);
                    self.emit(SimEvent::RegisterChanged(RegisterChanged {
                        id,
                        addr,
                        value,
                    }));
                    self.persist_registers().await;
                    Ok(())
                } else {
                    Err(SimError::UnknownDevice(id))
                };
                let _ = reply.send(result);
            }
            Command::GetRegister { id, addr, reply } => {
                let result = if self.registry.contains(id) {
                    Ok(self.bank.read(id, addr))
                } else {
                    Err(SimError::UnknownDevice(id))
                };
                let _ = reply.send(result);
            }
            Command::ListDevices { reply } => {
                let _ = reply.send(self.registry.list());
            }
            Command::GetDeviceState { id, reply } => {
                let _ = reply.send(self.registry.info(id));
            }
        }
    }

    fn open_port(
        &mut self,
        port_name: String,
        baud_rate: u32,
        line: LineSettings,
    ) -> SimResult<String> {
        if self.port.is_some() {
            let current = self.status_tx.borrow().port_name.clone().unwrap_or_default();
            return Err(SimError::AlreadyRunning(current));
        }

        let builder = tokio_serial::new(port_name.as_str(), baud_rate)
            .data_bits(line.data_bits.into())
            .parity(line.parity.into())
            .stop_bits(line.stop_bits.into())
            .timeout(Duration::from_millis(serial_consts::DEFAULT_TIMEOUT_MS));
        let stream = tokio_serial::SerialStream::open(&builder).map_err(|source| {
            SimError::OpenFailed {
                port: port_name.clone(),
                source,
            }
        })?;

        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(%port_name, baud_rate, %line, %session_id, "RTU server started");
        self.parser.clear();
        self.port = Some(stream);
        self.status_tx.send_replace(ServerStatus {
            running: true,
            port_name: Some(port_name.clone()),
            session_id: Some(session_id.clone()),
            bytes_read: 0,
            bytes_write: 0,
        });
        self.emit(SimEvent::ServerStatus { running: true });
        self.emit_log(LogEvent::info(format!(
            "server started on {port_name} at {baud_rate} baud, {line}"
        )));
        Ok(session_id)
    }

    /// Drop the serial stream and report the stopped state. In-flight
    /// frame assembly is discarded; the master retries on timeout.
    pub(crate) fn close_port(&mut self, reason: &str) {
        self.port = None;
        self.parser.clear();
        self.status_tx.send_replace(ServerStatus::default());
        self.emit(SimEvent::ServerStatus { running: false });
        self.emit_log(LogEvent::info(format!("server stopped: {reason}")));
        tracing::info!(reason, "RTU server stopped");
    }

    async fn handle_serial_read(&mut self, result: std::io::Result<usize>, buf: &[u8]) {
        match result {
            Ok(0) => {
                self.emit_log(LogEvent::err("serial stream closed by peer"));
                self.close_port("stream closed");
            }
            Ok(n) => {
                self.status_tx.send_modify(|status| status.bytes_read += n as u64);
                self.emit_log(LogEvent::rx(&buf[..n]));
                let parsed = self.parser.push(&buf[..n]);
                if parsed.overflowed {
                    tracing::warn!("frame buffer exceeded bound, flushed");
                    self.emit_log(LogEvent::warn("frame buffer overflow, input flushed"));
                }
                for request in parsed.frames {
                    if let Some(response) = self.dispatch(&request) {
                        self.send_response(&response).await;
                    }
                }
            }
            Err(err) => {
                tracing::error!("serial read failed: {err}");
                self.emit_log(LogEvent::err(format!("serial read failed: {err}")));
                self.close_port("read error");
            }
        }
    }

    /// Write a response and drain it to the OS buffer before returning,
    /// so responses leave in dispatch order.
    async fn send_response(&mut self, bytes: &[u8]) {
        let Some(port) = self.port.as_mut() else {
            return;
        };
        let result = match port.write_all(bytes).await {
            Ok(()) => port.flush().await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                self.status_tx
                    .send_modify(|status| status.bytes_write += bytes.len() as u64);
                self.emit_log(LogEvent::tx(bytes));
            }
            Err(err) => {
                tracing::error!("serial write failed: {err}");
                self.emit_log(LogEvent::err(format!("serial write failed: {err}")));
                self.close_port("write error");
            }
        }
    }

    /// One behavior-engine tick: drift telemetry of every enabled device
    /// left in random mode, one batched event per device.
    fn handle_tick(&mut self) {
        let targets: Vec<_> = self
            .registry
            .iter()
            .filter(|(_, device)| device.enabled && device.sim_mode == SimMode::Random)
            .map(|(id, device)| (id, device.device_type))
            .collect();
        for (id, device_type) in targets {
            let written = behavior::random_tick(&mut self.bank, id, device_type);
            if !written.is_empty() {
                self.emit(SimEvent::RegistersChanged(RegistersChanged::from_writes(
                    id, written,
                )));
            }
        }
    }

    /// Refresh the unlock idle timer after a committed write.
    pub(crate) fn touch_unlock(&mut self, id: u8, now_ms: u128) {
        if let Ok(device) = self.registry.get_mut(id) {
            if device.unlock.unlocked {
                device.unlock.last_activity_ms = now_ms;
            }
        }
    }
}

pub(crate) async fn run(
    mut core: SimCore,
    mut command_rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) {
    let persisted = core.storage.load().await;
    core.restore(persisted);

    let mut tick = tokio::time::interval(Duration::from_millis(behavior_consts::TICK_PERIOD_MS));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut read_buf = [0u8; serial_consts::READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if core.port.is_some() {
                    core.close_port("shutdown");
                }
                break;
            }
            command = command_rx.recv() => {
                match command {
                    Some(command) => core.handle_command(command).await,
                    None => {
                        if core.port.is_some() {
                            core.close_port("handle dropped");
                        }
                        break;
                    }
                }
            }
            result = core.port.as_mut().unwrap().read(&mut read_buf), if core.port.is_some() => {
                core.handle_serial_read(result, &read_buf).await;
            }
            _ = tick.tick() => {
                core.handle_tick();
            }
        }
    }
    tracing::info!("simulator core task stopped");
}
