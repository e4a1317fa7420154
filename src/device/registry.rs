//! Roster of simulated slaves.
//!
//! The registry owns the device records; register memory lives in the
//! [`RegisterBank`](crate::device::bank::RegisterBank) and is created and
//! freed alongside by the core, keeping the "memory exists iff the device
//! is in the roster" invariant in one place.

use std::collections::BTreeMap;

use crate::constants::modbus;
use crate::device::types::{Device, DeviceInfo, DeviceType, SimMode};
use crate::error::{SimError, SimResult};

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<u8, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slave with factory state: enabled, random sim mode, locked.
    pub fn add(&mut self, id: u8, device_type: DeviceType) -> SimResult<()> {
        if !(modbus::MIN_SLAVE_ID..=modbus::MAX_SLAVE_ID).contains(&id) {
            return Err(SimError::InvalidSlaveId(id));
        }
        if self.devices.contains_key(&id) {
            return Err(SimError::DuplicateDevice(id));
        }
        self.devices.insert(id, Device::new(device_type));
        Ok(())
    }

    pub fn remove(&mut self, id: u8) -> SimResult<Device> {
        self.devices.remove(&id).ok_or(SimError::UnknownDevice(id))
    }

    /// Change a device's type. Enabled flag and sim mode survive; unlock
    /// state resets with the memory, matching destroy-and-recreate.
    pub fn set_type(&mut self, id: u8, device_type: DeviceType) -> SimResult<()> {
        let device = self.get_mut(id)?;
        device.device_type = device_type;
        device.unlock = Default::default();
        Ok(())
    }

    pub fn set_enabled(&mut self, id: u8, enabled: bool) -> SimResult<()> {
        self.get_mut(id)?.enabled = enabled;
        Ok(())
    }

    pub fn set_sim_mode(&mut self, id: u8, sim_mode: SimMode) -> SimResult<()> {
        self.get_mut(id)?.sim_mode = sim_mode;
        Ok(())
    }

    pub fn get(&self, id: u8) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: u8) -> SimResult<&mut Device> {
        self.devices.get_mut(&id).ok_or(SimError::UnknownDevice(id))
    }

    pub fn contains(&self, id: u8) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn info(&self, id: u8) -> SimResult<DeviceInfo> {
        self.devices
            .get(&id)
            .map(|device| Self::to_info(id, device))
            .ok_or(SimError::UnknownDevice(id))
    }

    /// Roster snapshot ordered by slave id.
    pub fn list(&self) -> Vec<DeviceInfo> {
        self.devices
            .iter()
            .map(|(id, device)| Self::to_info(*id, device))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Device)> {
        self.devices.iter().map(|(id, device)| (*id, device))
    }

    fn to_info(id: u8, device: &Device) -> DeviceInfo {
        DeviceInfo {
            id,
            device_type: device.device_type,
            enabled: device.enabled,
            sim_mode: device.sim_mode,
        }
    }
}
