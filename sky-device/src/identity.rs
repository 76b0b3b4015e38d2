//! Identity learned from the box, cached so it survives restarts.

use serde::{Deserialize, Serialize};

use crate::client::DeviceIdentity;

/// Accessory information last learned from the box
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl CachedDeviceInfo {
    /// Field the info is stored under in the device document
    pub const STORE_KEY: &'static str = "CachedAccessoryInformation";

    pub const MANUFACTURER: &'static str = "Sky";

    pub fn from_identity(identity: &DeviceIdentity) -> Self {
        Self {
            manufacturer: Self::MANUFACTURER.to_string(),
            model: identity.model.clone(),
            serial_number: identity.serial.clone(),
            firmware_revision: identity.software.clone(),
        }
    }
}
