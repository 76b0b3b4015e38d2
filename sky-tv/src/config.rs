//! Plugin configuration as provided by the host.
//!
//! Field names match existing `sky-tv` configs:
//!
//! ```json
//! {
//!     "platform": "sky-tv.TVs",
//!     "external": false,
//!     "tvs": [
//!         {
//!             "name": "Lounge",
//!             "ip_address": "192.168.1.50",
//!             "tv_channels": { "101": "BBC One", "103": "ITV" }
//!         }
//!     ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One set-top box
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name; also the persistence key
    pub name: String,
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// Channel number to display name, in the order inputs are registered
    #[serde(default)]
    pub tv_channels: IndexMap<u32, String>,
    /// Publish this TV as its own HAP server instead of on the bridge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<bool>,
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip_address: ip_address.into(),
            manufacturer: None,
            model: None,
            serial_number: None,
            tv_channels: IndexMap::new(),
            external: None,
        }
    }

    pub fn with_channel(mut self, number: u32, name: impl Into<String>) -> Self {
        self.tv_channels.insert(number, name.into());
        self
    }

    pub fn with_external(mut self, external: bool) -> Self {
        self.external = Some(external);
        self
    }

    /// Name of the persisted state document for this TV
    pub fn storage_key(&self) -> String {
        format!("sky-tv.TV.{}.json", self.name)
    }

    /// Whether to publish externally, given the platform-wide default
    pub fn is_external(&self, platform_default: bool) -> bool {
        self.external.unwrap_or(platform_default)
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName { index });
        }
        if self.ip_address.trim().is_empty() {
            return Err(ConfigError::MissingAddress {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// The `TVs` platform block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub tvs: Vec<DeviceConfig>,
    /// Default for TVs without their own `external` flag
    #[serde(default)]
    pub external: bool,
    /// Where per-TV state documents are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_path: Option<PathBuf>,
}

impl PlatformConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Check every TV has a name and address, and names are unique
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, tv) in self.tvs.iter().enumerate() {
            tv.validate(index)?;
            if !seen.insert(tv.name.as_str()) {
                return Err(ConfigError::DuplicateName(tv.name.clone()));
            }
        }
        Ok(())
    }

    /// Configured persistence directory, or `<data dir>/sky-tv/persist`
    pub fn persist_dir(&self) -> PathBuf {
        self.persist_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sky-tv")
                .join("persist")
        })
    }
}
