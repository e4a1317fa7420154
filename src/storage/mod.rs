//! Durable state: the device roster and per-device sparse register
//! snapshots.
//!
//! Both artifacts are pretty-printed JSON at operator-supplied paths,
//! written to a temp file and renamed into place so a crash mid-flush
//! never leaves a torn file. Load failures fall back to built-in defaults
//! and are logged; persistence must never take the core down.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::device::types::{DeviceType, SimMode};
use crate::error::SimResult;

/// Roster record for one slave id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RosterEntry {
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub enabled: bool,
    pub sim_mode: SimMode,
}

/// Sparse register image: only non-zero values are kept.
pub type RegisterSnapshot = BTreeMap<u16, u16>;

/// Everything restored at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistedState {
    pub roster: BTreeMap<u8, RosterEntry>,
    pub registers: BTreeMap<u8, RegisterSnapshot>,
}

/// The factory roster used when no roster file exists yet: five inverters
/// on ids 1..=5 and two flow meters on the conventional 110/111.
pub fn default_roster() -> BTreeMap<u8, RosterEntry> {
    let mut roster = BTreeMap::new();
    for id in 1..=5u8 {
        roster.insert(
            id,
            RosterEntry {
                device_type: DeviceType::Inverter,
                enabled: true,
                sim_mode: SimMode::Random,
            },
        );
    }
    for id in [110u8, 111] {
        roster.insert(
            id,
            RosterEntry {
                device_type: DeviceType::FlowMeter,
                enabled: true,
                sim_mode: SimMode::Random,
            },
        );
    }
    roster
}

/// File-backed persistence at two operator-supplied paths.
#[derive(Debug, Clone)]
pub struct Storage {
    roster_path: PathBuf,
    registers_path: PathBuf,
}

impl Storage {
    pub fn new(roster_path: impl Into<PathBuf>, registers_path: impl Into<PathBuf>) -> Self {
        Self {
            roster_path: roster_path.into(),
            registers_path: registers_path.into(),
        }
    }

    /// Restore persisted state. The roster loads first; register images
    /// for ids the roster does not mention are dropped. A missing roster
    /// file yields the built-in default roster.
    pub async fn load(&self) -> PersistedState {
        let roster = match self.read_json::<BTreeMap<u8, RosterEntry>>(&self.roster_path).await {
            Some(roster) => roster,
            None => {
                tracing::info!(
                    path = %self.roster_path.display(),
                    "no usable roster file, starting from the default roster"
                );
                default_roster()
            }
        };

        let mut registers = self
            .read_json::<BTreeMap<u8, RegisterSnapshot>>(&self.registers_path)
            .await
            .unwrap_or_default();
        registers.retain(|id, _| {
            let known = roster.contains_key(id);
            if !known {
                tracing::warn!(id, "register snapshot for id not in roster, ignoring");
            }
            known
        });

        PersistedState { roster, registers }
    }

    /// Persist the roster; called on every registry mutation.
    pub async fn save_roster(&self, roster: &BTreeMap<u8, RosterEntry>) -> SimResult<()> {
        self.write_json(&self.roster_path, roster).await
    }

    /// Persist the sparse register images; called on operator-initiated
    /// register changes, not on master traffic.
    pub async fn save_registers(
        &self,
        registers: &BTreeMap<u8, RegisterSnapshot>,
    ) -> SimResult<()> {
        self.write_json(&self.registers_path, registers).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::error!(path = %path.display(), "read failed: {err}");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!(path = %path.display(), "corrupt file ignored: {err}");
                None
            }
        }
    }

    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> SimResult<()> {
        let raw = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (Storage, PathBuf) {
        let dir = std::env::temp_dir().join(format!("rs485-sim-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        (
            Storage::new(dir.join("roster.json"), dir.join("registers.json")),
            dir,
        )
    }

    #[tokio::test]
    async fn missing_files_yield_default_roster() {
        let (storage, dir) = temp_storage();
        let state = storage.load().await;
        assert_eq!(state.roster.len(), 7);
        assert_eq!(state.roster[&1].device_type, DeviceType::Inverter);
        assert_eq!(state.roster[&110].device_type, DeviceType::FlowMeter);
        assert!(state.registers.is_empty());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn save_and_reload_round_trips() {
        let (storage, dir) = temp_storage();

        let mut roster = BTreeMap::new();
        roster.insert(
            42,
            RosterEntry {
                device_type: DeviceType::EnergyMeter,
                enabled: false,
                sim_mode: SimMode::Manual,
            },
        );
        let mut registers = BTreeMap::new();
        registers.insert(42u8, BTreeMap::from([(0x082Eu16, 0x3F80u16), (7, 99)]));

        storage.save_roster(&roster).await.unwrap();
        storage.save_registers(&registers).await.unwrap();

        let state = storage.load().await;
        assert_eq!(state.roster, roster);
        assert_eq!(state.registers, registers);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn snapshots_for_unknown_ids_are_dropped() {
        let (storage, dir) = temp_storage();

        let mut roster = BTreeMap::new();
        roster.insert(
            1,
            RosterEntry {
                device_type: DeviceType::Inverter,
                enabled: true,
                sim_mode: SimMode::Random,
            },
        );
        let mut registers = BTreeMap::new();
        registers.insert(1u8, BTreeMap::from([(0x3000u16, 5000u16)]));
        registers.insert(99u8, BTreeMap::from([(0u16, 1u16)]));

        storage.save_roster(&roster).await.unwrap();
        storage.save_registers(&registers).await.unwrap();

        let state = storage.load().await;
        assert!(state.registers.contains_key(&1));
        assert!(!state.registers.contains_key(&99));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn corrupt_roster_falls_back_to_defaults() {
        let (storage, dir) = temp_storage();
        std::fs::write(dir.join("roster.json"), b"{ not json").unwrap();
        let state = storage.load().await;
        assert_eq!(state.roster, default_roster());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn roster_file_is_human_readable_json() {
        let (storage, dir) = temp_storage();
        storage.save_roster(&default_roster()).await.unwrap();
        let text = std::fs::read_to_string(dir.join("roster.json")).unwrap();
        assert!(text.contains("\"type\": \"inverter\""));
        assert!(text.contains("\"sim_mode\": \"random\""));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
