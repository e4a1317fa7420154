//! Device behavior engine: reactive write hooks and periodic telemetry.
//!
//! Reactive hooks fire when the dispatcher commits a write to a register
//! with attached semantics (control command, password, reported
//! parameters). The periodic half runs on the core's 1 Hz tick and drifts
//! energy meter telemetry for devices left in random mode.

use rand::Rng;

use crate::device::bank::RegisterBank;
use crate::device::profiles::{energymeter, inverter};
use crate::device::types::{Device, DeviceType};
use crate::protocol::f32_to_words;

/// Semantic hook attached to a `(device type, address)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// Inverter run/stop command; re-seeds the telemetry block.
    ControlCommand,
    /// Parameter register reported to the operator by name.
    ParameterReport(&'static str),
    /// Password register; establishes or enters the password.
    PasswordWrite,
}

/// Look up the hook for a committed write, if any.
pub fn hook_for(device_type: DeviceType, addr: u16) -> Option<Hook> {
    if device_type != DeviceType::Inverter {
        return None;
    }
    match addr {
        inverter::REG_CONTROL => Some(Hook::ControlCommand),
        inverter::REG_PASSWORD => Some(Hook::PasswordWrite),
        inverter::REG_PARAM_FREQ_SOURCE => Some(Hook::ParameterReport("main frequency source")),
        inverter::REG_PARAM_FREQ_DIGITAL => Some(Hook::ParameterReport("digital frequency setting")),
        inverter::REG_PARAM_MOTOR_VOLTAGE => Some(Hook::ParameterReport("motor rated voltage")),
        inverter::REG_PARAM_COMMAND_SOURCE => Some(Hook::ParameterReport("command source")),
        inverter::REG_PARAM_COMM_ADDRESS => Some(Hook::ParameterReport("communication address")),
        _ => None,
    }
}

/// Human-readable interpretation of a reported parameter value.
pub fn interpret_parameter(addr: u16, value: u16) -> String {
    match addr {
        inverter::REG_PARAM_COMMAND_SOURCE => match value {
            0 => "Keypad".to_string(),
            1 => "Terminal".to_string(),
            2 => "RS485/Comm".to_string(),
            other => format!("reserved ({other})"),
        },
        inverter::REG_PARAM_FREQ_DIGITAL => format!("{:.2} Hz", f64::from(value) / 100.0),
        inverter::REG_PARAM_MOTOR_VOLTAGE => format!("{value} V"),
        _ => value.to_string(),
    }
}

/// Outcome of a password-register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordOutcome {
    /// No password was stored; the written value becomes the password.
    Established,
    /// Matched the stored password; the device is now unlocked.
    Unlocked,
    /// Mismatch; state is unchanged.
    Rejected,
}

/// Apply a write to the password register.
///
/// The register store only changes when a new password is established;
/// entering a password (right or wrong) never overwrites the stored one.
pub fn apply_password_write(
    device: &mut Device,
    bank: &mut RegisterBank,
    id: u8,
    value: u16,
    now_ms: u128,
) -> PasswordOutcome {
    let stored = bank.read(id, inverter::REG_PASSWORD);
    if stored == 0 {
        bank.write(id, inverter::REG_PASSWORD, value);
        return PasswordOutcome::Established;
    }
    if value == stored {
        device.unlock.unlocked = true;
        device.unlock.last_activity_ms = now_ms;
        return PasswordOutcome::Unlocked;
    }
    PasswordOutcome::Rejected
}

/// Re-seed inverter telemetry in response to a control command. Values are
/// derived from the slave id so a master test bench can tell devices
/// apart. Returns the registers written, primary and mirror, for the
/// batched change event.
pub fn apply_control_command(bank: &mut RegisterBank, id: u8, command: u16) -> Vec<(u16, u16)> {
    let wide = u16::from(id);
    let values: [(u16, u16); 6] = match command {
        // stop, coast stop, fault reset via stop key
        0 | 5 | 6 => [
            (inverter::REG_FREQUENCY, 0),
            (inverter::REG_VOLTAGE, 0),
            (inverter::REG_CURRENT, 0),
            (inverter::REG_POWER, 0),
            (inverter::REG_SPEED, 0),
            (inverter::REG_ENERGY, 0),
        ],
        // run forward/reverse, jog forward/reverse
        1..=4 => [
            (inverter::REG_FREQUENCY, wide.wrapping_mul(1000)),
            (inverter::REG_VOLTAGE, (100 + 10 * wide).wrapping_mul(10)),
            (inverter::REG_CURRENT, wide.wrapping_mul(10)),
            (inverter::REG_POWER, wide.wrapping_mul(10)),
            (inverter::REG_SPEED, wide.wrapping_mul(100)),
            (inverter::REG_ENERGY, wide),
        ],
        _ => return Vec::new(),
    };

    let mut written = Vec::with_capacity(values.len() * 2);
    for (addr, value) in values {
        bank.write(id, addr, value);
        written.push((addr, value));
        let mirror = inverter::mirror(addr);
        bank.write(id, mirror, value);
        written.push((mirror, value));
    }
    written
}

/// One telemetry drift step for a device in random sim mode. Only energy
/// meters drift; inverter and flow meter telemetry move in response to
/// writes alone. Returns the register batch written this tick.
pub fn random_tick(bank: &mut RegisterBank, id: u8, device_type: DeviceType) -> Vec<(u16, u16)> {
    if device_type != DeviceType::EnergyMeter {
        return Vec::new();
    }
    let mut rng = rand::thread_rng();

    // three-phase voltage around 220 V (+/-2 %), current 5..10 A
    let voltages: [f32; 3] = std::array::from_fn(|_| rng.gen_range(215.6..224.4));
    let currents: [f32; 3] = std::array::from_fn(|_| rng.gen_range(5.0..10.0));
    let powers: [f32; 3] = std::array::from_fn(|i| voltages[i] * currents[i]);
    let total: f32 = powers.iter().sum();
    let frequency = rng.gen_range(49.9..50.1);

    let floats = [
        (energymeter::REG_VOLTAGE_L1, voltages[0]),
        (energymeter::REG_VOLTAGE_L2, voltages[1]),
        (energymeter::REG_VOLTAGE_L3, voltages[2]),
        (energymeter::REG_CURRENT_L1, currents[0]),
        (energymeter::REG_CURRENT_L2, currents[1]),
        (energymeter::REG_CURRENT_L3, currents[2]),
        (energymeter::REG_POWER_L1, powers[0]),
        (energymeter::REG_POWER_L2, powers[1]),
        (energymeter::REG_POWER_L3, powers[2]),
        (energymeter::REG_POWER_TOTAL, total),
        (energymeter::REG_FREQUENCY, frequency),
    ];

    let mut written = Vec::with_capacity(floats.len() * 2);
    for (base, value) in floats {
        let words = f32_to_words(value);
        bank.write(id, base, words[0]);
        bank.write(id, base + 1, words[1]);
        written.push((base, words[0]));
        written.push((base + 1, words[1]));
    }
    written
}
