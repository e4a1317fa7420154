//! Request dispatcher: turns a CRC-validated request into at most one
//! response frame, consulting the registry, the bank, the write validator
//! and the reactive hooks.
//!
//! Slaves missing from the roster and disabled slaves produce no response
//! at all, matching bus-absent semantics. Exception replies carry the
//! request function code with the high bit set.

use crate::constants::modbus;
use crate::device::behavior::{self, Hook, PasswordOutcome};
use crate::device::validator;
use crate::events::{LogEvent, RegisterChanged, RegistersChanged, SimEvent};
use crate::protocol::{self, ExceptionCode, FunctionCode, Request};
use crate::sim::core::SimCore;
use crate::sim::helpers::timestamp_now_ms;

impl SimCore {
    /// Process one request. `None` means nothing goes on the wire.
    pub(crate) fn dispatch(&mut self, request: &Request) -> Option<Vec<u8>> {
        let id = request.unit_id();
        let enabled = match self.registry.get(id) {
            Some(device) => device.enabled,
            None => {
                tracing::trace!(id, "frame for slave not in roster, no response");
                return None;
            }
        };
        if !enabled {
            self.emit_log(LogEvent::info(format!(
                "request for disabled slave {id} discarded"
            )));
            return None;
        }

        match request {
            Request::ReadRegisters {
                function,
                start,
                count,
                ..
            } => Some(self.read_registers(id, *function, *start, *count)),
            Request::WriteSingle { addr, value, .. } => {
                Some(self.write_single(id, *addr, *value))
            }
            Request::WriteMultiple {
                start,
                count,
                values,
                ..
            } => Some(self.write_multiple(id, *start, *count, values)),
        }
    }

    fn read_registers(&mut self, id: u8, function: FunctionCode, start: u16, count: u16) -> Vec<u8> {
        let window_end = u32::from(start) + u32::from(count);
        if count == 0 || count > modbus::MAX_READ_COUNT || window_end > 0x1_0000 {
            return self.reject(id, function, ExceptionCode::IllegalDataValue, start);
        }
        let values = self.bank.read_many(id, start, count);
        protocol::read_response(id, function, &values)
    }

    fn write_single(&mut self, id: u8, addr: u16, value: u16) -> Vec<u8> {
        let function = FunctionCode::WriteSingleRegister;
        let now_ms = timestamp_now_ms();
        // the device is known to exist: dispatch checked the roster and
        // nothing else runs in between
        let check = match self.registry.get_mut(id) {
            Ok(device) => validator::check_write(device, &self.bank, id, addr, value, now_ms),
            Err(_) => {
                return protocol::exception_response(id, function, ExceptionCode::SlaveDeviceFailure)
            }
        };
        if check.auto_locked {
            self.note_auto_lock(id);
        }
        match check.verdict {
            Err(code) => self.reject(id, function, code, addr),
            Ok(()) => {
                self.commit_write(id, addr, value, now_ms);
                protocol::write_single_response(id, addr, value)
            }
        }
    }

    /// FC 16 is atomic: every sub-write validates before any commits, and
    /// the first failure's exception code is the reply.
    fn write_multiple(&mut self, id: u8, start: u16, count: u16, values: &[u16]) -> Vec<u8> {
        let function = FunctionCode::WriteMultipleRegisters;
        let window_end = u32::from(start) + u32::from(count);
        if count == 0
            || count > modbus::MAX_WRITE_COUNT
            || values.len() != count as usize
            || window_end > 0x1_0000
        {
            return self.reject(id, function, ExceptionCode::IllegalDataValue, start);
        }

        let now_ms = timestamp_now_ms();
        let mut failure = None;
        let mut auto_locked = false;
        match self.registry.get_mut(id) {
            Ok(device) => {
                for (offset, value) in values.iter().enumerate() {
                    let addr = start + offset as u16;
                    let check =
                        validator::check_write(device, &self.bank, id, addr, *value, now_ms);
                    auto_locked |= check.auto_locked;
                    if let Err(code) = check.verdict {
                        failure = Some((addr, code));
                        break;
                    }
                }
            }
            Err(_) => {
                return protocol::exception_response(id, function, ExceptionCode::SlaveDeviceFailure)
            }
        }
        if auto_locked {
            self.note_auto_lock(id);
        }
        if let Some((addr, code)) = failure {
            return self.reject(id, function, code, addr);
        }

        for (offset, value) in values.iter().enumerate() {
            self.commit_write(id, start + offset as u16, *value, now_ms);
        }
        protocol::write_multiple_response(id, start, count)
    }

    /// Apply an accepted write: mutate the bank, run the reactive hook and
    /// emit change events.
    fn commit_write(&mut self, id: u8, addr: u16, value: u16, now_ms: u128) {
        let Some(device_type) = self.registry.get(id).map(|device| device.device_type) else {
            return;
        };
        match behavior::hook_for(device_type, addr) {
            Some(Hook::PasswordWrite) => {
                let Ok(device) = self.registry.get_mut(id) else {
                    return;
                };
                let outcome =
                    behavior::apply_password_write(device, &mut self.bank, id, value, now_ms);
                match outcome {
                    PasswordOutcome::Established => {
                        self.emit(SimEvent::RegisterChanged(RegisterChanged {
                            id,
                            addr,
                            value,
                        }));
                        self.emit_log(LogEvent::info(format!(
                            "slave {id}: parameter password established"
                        )));
                    }
                    PasswordOutcome::Unlocked => {
                        self.emit_log(LogEvent::info(format!("slave {id}: parameters unlocked")));
                    }
                    PasswordOutcome::Rejected => {
                        self.emit_log(LogEvent::warn(format!(
                            "slave {id}: parameter password mismatch"
                        )));
                    }
                }
                return;
            }
            Some(Hook::ControlCommand) => {
                self.bank.write(id, addr, value);
                self.emit(SimEvent::RegisterChanged(RegisterChanged { id, addr, value }));
                let written = behavior::apply_control_command(&mut self.bank, id, value);
                if !written.is_empty() {
                    self.emit(SimEvent::RegistersChanged(RegistersChanged::from_writes(
                        id, written,
                    )));
                }
            }
            Some(Hook::ParameterReport(name)) => {
                self.bank.write(id, addr, value);
                self.emit(SimEvent::RegisterChanged(RegisterChanged { id, addr, value }));
                self.emit_log(LogEvent::info(format!(
                    "slave {id}: {name} (0x{addr:04X}) = {}",
                    behavior::interpret_parameter(addr, value)
                )));
            }
            None => {
                self.bank.write(id, addr, value);
                self.emit(SimEvent::RegisterChanged(RegisterChanged { id, addr, value }));
            }
        }
        self.touch_unlock(id, now_ms);
    }

    fn note_auto_lock(&self, id: u8) {
        self.emit_log(LogEvent::info(format!(
            "slave {id}: parameter unlock expired"
        )));
    }

    fn reject(&self, id: u8, function: FunctionCode, code: ExceptionCode, addr: u16) -> Vec<u8> {
        tracing::warn!(id, addr, ?code, "{} rejected", function.name());
        self.emit_log(LogEvent::warn(format!(
            "slave {id}: {} at 0x{addr:04X} rejected ({code:?})",
            function.name()
        )));
        protocol::exception_response(id, function, code)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{broadcast, watch};

    use crate::device::DeviceType;
    use crate::events::{ServerStatus, SimEvent};
    use crate::protocol::{crc16, parser::FrameParser, seal};
    use crate::sim::core::SimCore;
    use crate::storage::Storage;

    fn core_under_test() -> SimCore {
        let dir = std::env::temp_dir().join(format!("rs485-sim-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let storage = Storage::new(dir.join("roster.json"), dir.join("registers.json"));
        let (event_tx, _) = broadcast::channel(64);
        let (status_tx, _) = watch::channel(ServerStatus::default());
        let mut core = SimCore::new(storage, event_tx, status_tx);
        core.registry.add(1, DeviceType::Inverter).unwrap();
        core.bank.create(1, DeviceType::Inverter);
        core.registry.add(2, DeviceType::Inverter).unwrap();
        core.bank.create(2, DeviceType::Inverter);
        core
    }

    /// Feed raw wire bytes through the parser and dispatcher, returning
    /// the response bytes, if any.
    fn exchange(core: &mut SimCore, frame: &[u8]) -> Option<Vec<u8>> {
        let mut parser = FrameParser::new();
        let mut parsed = parser.push(frame);
        assert_eq!(parsed.frames.len(), 1, "request must parse: {frame:02X?}");
        core.dispatch(&parsed.frames.remove(0))
    }

    #[test]
    fn read_two_holding_registers_from_defaults() {
        let mut core = core_under_test();
        let request = seal(vec![0x01, 0x03, 0x30, 0x00, 0x00, 0x02]);
        let response = exchange(&mut core, &request).unwrap();
        // 0x1388 = 5000 default frequency, next register zero
        assert_eq!(&response[..7], &[0x01, 0x03, 0x04, 0x13, 0x88, 0x00, 0x00]);
        let crc = crc16(&response[..7]);
        assert_eq!(&response[7..], &[(crc & 0xFF) as u8, (crc >> 8) as u8]);
    }

    #[test]
    fn run_command_echoes_and_reseeds_telemetry() {
        let mut core = core_under_test();
        let request = seal(vec![0x01, 0x06, 0x20, 0x00, 0x00, 0x01]);
        assert_eq!(request, vec![0x01, 0x06, 0x20, 0x00, 0x00, 0x01, 0x43, 0xCA]);
        let response = exchange(&mut core, &request).unwrap();
        assert_eq!(response, request);
        assert_eq!(core.bank.read(1, 0x3000), 0x03E8);
        assert_eq!(core.bank.read(1, 0x0300), 0x03E8);
    }

    #[test]
    fn write_to_read_only_register_yields_illegal_address() {
        let mut core = core_under_test();
        let request = seal(vec![0x01, 0x06, 0x30, 0x00, 0x00, 0xFF]);
        let response = exchange(&mut core, &request).unwrap();
        assert_eq!(&response[..3], &[0x01, 0x86, 0x02]);
        assert_eq!(core.bank.read(1, 0x3000), 5000);
    }

    #[test]
    fn unknown_slave_gets_no_response() {
        let mut core = core_under_test();
        let request = seal(vec![0x09, 0x03, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(exchange(&mut core, &request), None);
    }

    #[test]
    fn disabled_slave_gets_no_response() {
        let mut core = core_under_test();
        core.registry.set_enabled(2, false).unwrap();
        let request = seal(vec![0x02, 0x03, 0x30, 0x00, 0x00, 0x01]);
        assert_eq!(exchange(&mut core, &request), None);

        core.registry.set_enabled(2, true).unwrap();
        assert!(exchange(&mut core, &request).is_some());
    }

    #[test]
    fn oversized_read_count_yields_illegal_value() {
        let mut core = core_under_test();
        // count 126 > 125
        let request = seal(vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x7E]);
        let response = exchange(&mut core, &request).unwrap();
        assert_eq!(&response[..3], &[0x01, 0x83, 0x03]);
    }

    #[test]
    fn read_window_overflow_yields_illegal_value() {
        let mut core = core_under_test();
        // 0xFFFF + 2 runs past the address space
        let request = seal(vec![0x01, 0x03, 0xFF, 0xFF, 0x00, 0x02]);
        let response = exchange(&mut core, &request).unwrap();
        assert_eq!(&response[..3], &[0x01, 0x83, 0x03]);
    }

    #[test]
    fn write_multiple_is_atomic() {
        let mut core = core_under_test();
        core.bank.write(1, 0x2FFF, 77);
        // [0x2FFF = 30000, 0x3000 = 0]: second target is read-only
        let mut body = vec![0x01, 0x10, 0x2F, 0xFF, 0x00, 0x02, 0x04];
        body.extend_from_slice(&30000u16.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
        let response = exchange(&mut core, &seal(body)).unwrap();
        assert_eq!(&response[..3], &[0x01, 0x90, 0x02]);
        // nothing was mutated
        assert_eq!(core.bank.read(1, 0x2FFF), 77);
        assert_eq!(core.bank.read(1, 0x3000), 5000);
    }

    #[test]
    fn write_multiple_applies_all_and_acknowledges() {
        let mut core = core_under_test();
        let mut body = vec![0x01, 0x10, 0x20, 0x01, 0x00, 0x02, 0x04];
        body.extend_from_slice(&30000u16.to_be_bytes());
        body.extend_from_slice(&500u16.to_be_bytes());
        let response = exchange(&mut core, &seal(body)).unwrap();
        assert_eq!(&response[..6], &[0x01, 0x10, 0x20, 0x01, 0x00, 0x02]);
        assert_eq!(core.bank.read(1, 0x2001), 30000);
        assert_eq!(core.bank.read(1, 0x2002), 500);
    }

    #[test]
    fn write_multiple_count_mismatch_yields_illegal_value() {
        let mut core = core_under_test();
        // declares count 3 but carries 2 values
        let mut body = vec![0x01, 0x10, 0x20, 0x01, 0x00, 0x03, 0x04];
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&2u16.to_be_bytes());
        let response = exchange(&mut core, &seal(body)).unwrap();
        assert_eq!(&response[..3], &[0x01, 0x90, 0x03]);
    }

    #[test]
    fn password_unlock_allows_protected_writes() {
        let mut core = core_under_test();
        core.bank.write(1, 0x0000, 1234);
        core.bank.write(1, 0x0002, 1);

        // locked: ordinary parameter write fails with device-failure
        let request = seal(vec![0x01, 0x06, 0x0B, 0x15, 0x00, 0x32]);
        let response = exchange(&mut core, &request).unwrap();
        assert_eq!(&response[..3], &[0x01, 0x86, 0x04]);
        assert_eq!(core.bank.read(1, 0x0B15), 45);

        // wrong password: echoed, still locked
        let wrong = seal(vec![0x01, 0x06, 0x00, 0x00, 0x11, 0x11]);
        let response = exchange(&mut core, &wrong).unwrap();
        assert_eq!(response, wrong);
        assert!(!core.registry.get(1).unwrap().unlock.unlocked);
        assert_eq!(core.bank.read(1, 0x0000), 1234);

        // correct password unlocks
        let unlock = seal(vec![0x01, 0x06, 0x00, 0x00, 0x04, 0xD2]);
        exchange(&mut core, &unlock).unwrap();
        assert!(core.registry.get(1).unwrap().unlock.unlocked);

        // retry the parameter write
        let response = exchange(&mut core, &request).unwrap();
        assert_eq!(response, request);
        assert_eq!(core.bank.read(1, 0x0B15), 0x32);
    }

    #[test]
    fn first_password_write_establishes_it() {
        let mut core = core_under_test();
        let request = seal(vec![0x01, 0x06, 0x00, 0x00, 0x04, 0xD2]);
        let response = exchange(&mut core, &request).unwrap();
        assert_eq!(response, request);
        assert_eq!(core.bank.read(1, 0x0000), 1234);
        assert!(!core.registry.get(1).unwrap().unlock.unlocked);
    }

    #[test]
    fn committed_writes_emit_register_changed_events() {
        let mut core = core_under_test();
        let mut events = core.event_tx.subscribe();
        let request = seal(vec![0x01, 0x06, 0x0B, 0x15, 0x00, 0x32]);
        exchange(&mut core, &request).unwrap();

        let mut saw_change = false;
        while let Ok(event) = events.try_recv() {
            if let SimEvent::RegisterChanged(change) = event {
                assert_eq!((change.id, change.addr, change.value), (1, 0x0B15, 0x32));
                saw_change = true;
            }
        }
        assert!(saw_change);
    }

    #[test]
    fn parameter_report_registers_log_their_name() {
        let mut core = core_under_test();
        let mut events = core.event_tx.subscribe();
        // 0x8200 = 2 -> RS485/Comm
        let request = seal(vec![0x01, 0x06, 0x82, 0x00, 0x00, 0x02]);
        exchange(&mut core, &request).unwrap();

        let mut saw_report = false;
        while let Ok(event) = events.try_recv() {
            if let SimEvent::Log(log) = event {
                if log.text.contains("command source") {
                    assert!(log.text.contains("RS485/Comm"));
                    saw_report = true;
                }
            }
        }
        assert!(saw_report);
    }

    #[test]
    fn flowmeter_writes_are_unvalidated() {
        let mut core = core_under_test();
        core.registry.add(110, DeviceType::FlowMeter).unwrap();
        core.bank.create(110, DeviceType::FlowMeter);
        // address inside what would be a read-only group on an inverter
        let request = seal(vec![0x6E, 0x06, 0x30, 0x00, 0x00, 0x07]);
        let response = exchange(&mut core, &request).unwrap();
        assert_eq!(response, request);
        assert_eq!(core.bank.read(110, 0x3000), 7);
    }
}
