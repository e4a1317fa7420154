use std::{fmt, str::FromStr};

use rootcause::{report, Report};

/// Kind of field device a slave impersonates. Determines the default
/// register layout and which semantic hooks fire on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Inverter,
    FlowMeter,
    EnergyMeter,
}

impl FromStr for DeviceType {
    type Err = Report;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inverter" | "Inverter" => Ok(Self::Inverter),
            "flowmeter" | "FlowMeter" => Ok(Self::FlowMeter),
            "energymeter" | "EnergyMeter" => Ok(Self::EnergyMeter),
            _ => Err(report!("unknown device type: {}", s)),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inverter => "inverter",
            Self::FlowMeter => "flowmeter",
            Self::EnergyMeter => "energymeter",
        };
        f.write_str(s)
    }
}

/// Whether the behavior engine periodically mutates a device's telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimMode {
    Random,
    Manual,
}

impl FromStr for SimMode {
    type Err = Report;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" | "Random" => Ok(Self::Random),
            "manual" | "Manual" => Ok(Self::Manual),
            _ => Err(report!("unknown sim mode: {}", s)),
        }
    }
}

impl fmt::Display for SimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Random => "random",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Parameter-protection unlock state. Only inverters ever leave the locked
/// default; the timestamp is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct UnlockState {
    pub unlocked: bool,
    pub last_activity_ms: u128,
}

/// One simulated slave in the roster.
#[derive(Debug, Clone)]
pub struct Device {
    pub device_type: DeviceType,
    pub enabled: bool,
    pub sim_mode: SimMode,
    pub unlock: UnlockState,
}

impl Device {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            enabled: true,
            sim_mode: SimMode::Random,
            unlock: UnlockState::default(),
        }
    }
}

/// Roster entry as reported to the operator and persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceInfo {
    pub id: u8,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub enabled: bool,
    pub sim_mode: SimMode,
}
