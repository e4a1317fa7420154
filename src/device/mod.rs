//! Device model: roster, register memory, protection rules and simulated
//! behaviors.

pub mod bank;
pub mod behavior;
pub mod profiles;
pub mod registry;
pub mod types;
pub mod validator;

pub use bank::RegisterBank;
pub use registry::DeviceRegistry;
pub use types::{Device, DeviceInfo, DeviceType, SimMode, UnlockState};
