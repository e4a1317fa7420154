//! Events emitted when register memory changes.

use std::collections::BTreeMap;

/// Payload for a single register change.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegisterChanged {
    pub id: u8,
    pub addr: u16,
    pub value: u16,
}

/// Batched payload for a hook or telemetry tick touching many registers
/// of one device at once.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegistersChanged {
    pub id: u8,
    pub updates: BTreeMap<u16, u16>,
}

impl RegistersChanged {
    pub fn from_writes(id: u8, writes: impl IntoIterator<Item = (u16, u16)>) -> Self {
        Self {
            id,
            updates: writes.into_iter().collect(),
        }
    }
}
