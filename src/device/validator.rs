//! Master-write validation for inverter parameter protection.
//!
//! Non-inverter types accept any write. For inverters the checks run in a
//! fixed order: password register first (always writable), then read-only
//! groups, then the protection lock, then value ranges. A rejected write
//! turns into the Modbus exception carried in the verdict.
//!
//! The lock rejection reuses exception 0x04 (slave device failure) since
//! Modbus has no dedicated "locked" code; masters that misread 0x04 can be
//! served 0x02 instead without breaking anything here.

use crate::constants::unlock;
use crate::device::bank::RegisterBank;
use crate::device::profiles::inverter;
use crate::device::types::{Device, DeviceType};
use crate::protocol::ExceptionCode;

/// Outcome of validating one `(addr, value)` write.
#[derive(Debug)]
pub struct WriteCheck {
    pub verdict: Result<(), ExceptionCode>,
    /// Set when this validation observed the idle timeout and re-locked
    /// the device.
    pub auto_locked: bool,
}

impl WriteCheck {
    fn allow(auto_locked: bool) -> Self {
        Self {
            verdict: Ok(()),
            auto_locked,
        }
    }

    fn reject(code: ExceptionCode, auto_locked: bool) -> Self {
        Self {
            verdict: Err(code),
            auto_locked,
        }
    }
}

/// Validate a single register write against the device's protection rules.
///
/// Does not touch the register store and does not refresh the unlock
/// activity timestamp; the dispatcher refreshes after a write actually
/// commits, so an FC 16 batch that fails validation leaves no trace.
pub fn check_write(
    device: &mut Device,
    bank: &RegisterBank,
    id: u8,
    addr: u16,
    value: u16,
    now_ms: u128,
) -> WriteCheck {
    let auto_locked = expire_idle_unlock(device, now_ms);
    if device.device_type != DeviceType::Inverter {
        return WriteCheck::allow(auto_locked);
    }

    if addr == inverter::REG_PASSWORD {
        return WriteCheck::allow(auto_locked);
    }

    if is_read_only(addr) {
        return WriteCheck::reject(ExceptionCode::IllegalDataAddress, auto_locked);
    }

    let protected = bank.read(id, inverter::REG_PROTECTION) == 1;
    if protected && addr != inverter::REG_PROTECTION && !device.unlock.unlocked {
        return WriteCheck::reject(ExceptionCode::SlaveDeviceFailure, auto_locked);
    }

    if !value_in_range(addr, value) {
        return WriteCheck::reject(ExceptionCode::IllegalDataValue, auto_locked);
    }

    WriteCheck::allow(auto_locked)
}

/// Clear the unlock flag after the idle window; returns whether this call
/// performed the transition. Reads never refresh the timer.
pub fn expire_idle_unlock(device: &mut Device, now_ms: u128) -> bool {
    if device.unlock.unlocked
        && now_ms.saturating_sub(device.unlock.last_activity_ms) > unlock::IDLE_TIMEOUT_MS
    {
        device.unlock.unlocked = false;
        return true;
    }
    false
}

fn is_read_only(addr: u16) -> bool {
    inverter::U00_RANGE.contains(&addr)
        || inverter::U01_RANGE.contains(&addr)
        || inverter::READ_ONLY_REGS.contains(&addr)
}

fn value_in_range(addr: u16, value: u16) -> bool {
    match addr {
        inverter::REG_CONTROL => value <= 7,
        inverter::REG_FREQ_SETPOINT => value <= 60000,
        inverter::REG_PID_SETPOINT | inverter::REG_PID_FEEDBACK => value <= 1000,
        inverter::REG_TORQUE_SETPOINT => (-3000..=3000).contains(&(value as i16)),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::unlock::IDLE_TIMEOUT_MS;
    use crate::device::types::Device;

    const NOW: u128 = 1_700_000_000_000;

    fn inverter_under_test() -> (Device, RegisterBank) {
        let mut bank = RegisterBank::new();
        bank.create(1, DeviceType::Inverter);
        (Device::new(DeviceType::Inverter), bank)
    }

    fn verdict(device: &mut Device, bank: &RegisterBank, addr: u16, value: u16) -> Result<(), ExceptionCode> {
        check_write(device, bank, 1, addr, value, NOW).verdict
    }

    #[test]
    fn non_inverters_accept_everything() {
        let mut bank = RegisterBank::new();
        bank.create(2, DeviceType::FlowMeter);
        let mut device = Device::new(DeviceType::FlowMeter);
        let check = check_write(&mut device, &bank, 2, 0x3000, 0xFFFF, NOW);
        assert!(check.verdict.is_ok());
    }

    #[test]
    fn read_only_groups_reject_with_illegal_address() {
        let (mut device, bank) = inverter_under_test();
        for addr in [0x3000, 0x30FF, 0x3100, 0x31FF, 0x2100, 0x2101] {
            assert_eq!(
                verdict(&mut device, &bank, addr, 1),
                Err(ExceptionCode::IllegalDataAddress),
                "addr {addr:#06X}"
            );
        }
        // mirrors are not protected
        assert!(verdict(&mut device, &bank, 0x0300, 1).is_ok());
    }

    #[test]
    fn control_register_ranges() {
        let (mut device, bank) = inverter_under_test();
        assert!(verdict(&mut device, &bank, 0x2000, 7).is_ok());
        assert_eq!(
            verdict(&mut device, &bank, 0x2000, 8),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert!(verdict(&mut device, &bank, 0x2001, 60000).is_ok());
        assert_eq!(
            verdict(&mut device, &bank, 0x2001, 60001),
            Err(ExceptionCode::IllegalDataValue)
        );
        // -3000 as u16
        assert!(verdict(&mut device, &bank, 0x2004, (-3000i16) as u16).is_ok());
        assert_eq!(
            verdict(&mut device, &bank, 0x2004, (-3001i16) as u16),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert_eq!(
            verdict(&mut device, &bank, 0x2004, 3001),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn protection_locks_everything_but_password_and_itself() {
        let (mut device, mut bank) = inverter_under_test();
        bank.write(1, inverter::REG_PROTECTION, 1);
        assert_eq!(
            verdict(&mut device, &bank, 0x0B15, 50),
            Err(ExceptionCode::SlaveDeviceFailure)
        );
        // protection is checked before value ranges
        assert_eq!(
            verdict(&mut device, &bank, 0x2001, 60001),
            Err(ExceptionCode::SlaveDeviceFailure)
        );
        assert!(verdict(&mut device, &bank, inverter::REG_PASSWORD, 1234).is_ok());
        assert!(verdict(&mut device, &bank, inverter::REG_PROTECTION, 0).is_ok());
    }

    #[test]
    fn unlocked_device_writes_through_protection() {
        let (mut device, mut bank) = inverter_under_test();
        bank.write(1, inverter::REG_PROTECTION, 1);
        device.unlock.unlocked = true;
        device.unlock.last_activity_ms = NOW;
        assert!(verdict(&mut device, &bank, 0x0B15, 50).is_ok());
    }

    #[test]
    fn unlock_expires_after_idle_timeout() {
        let (mut device, mut bank) = inverter_under_test();
        bank.write(1, inverter::REG_PROTECTION, 1);
        device.unlock.unlocked = true;
        device.unlock.last_activity_ms = NOW;

        let later = NOW + IDLE_TIMEOUT_MS + 1;
        let check = check_write(&mut device, &bank, 1, 0x0B15, 50, later);
        assert!(check.auto_locked);
        assert_eq!(check.verdict, Err(ExceptionCode::SlaveDeviceFailure));
        assert!(!device.unlock.unlocked);
    }

    #[test]
    fn unlock_survives_within_idle_window() {
        let (mut device, mut bank) = inverter_under_test();
        bank.write(1, inverter::REG_PROTECTION, 1);
        device.unlock.unlocked = true;
        device.unlock.last_activity_ms = NOW;

        let later = NOW + IDLE_TIMEOUT_MS;
        let check = check_write(&mut device, &bank, 1, 0x0B15, 50, later);
        assert!(!check.auto_locked);
        assert!(check.verdict.is_ok());
    }
}
