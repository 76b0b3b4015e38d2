//! # Sky TV for HomeKit
//!
//! Exposes Sky set-top boxes as HomeKit television accessories:
//!
//! ```rust,ignore
//! use sky_tv::{PlatformConfig, SkyTvPlugin};
//!
//! let plugin = SkyTvPlugin::new(persist_dir, client);
//! let config = PlatformConfig::from_path("config.json")?;
//! let platform = plugin.platform(config, host);
//!
//! // Bridge accessories are returned, external ones go to `host`
//! for accessory in platform.accessories().await {
//!     println!("{} ({})", accessory.display_name, accessory.uuid);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! AccessoryPlatform / SkyTvPlugin
//!     ↓
//! TelevisionAccessory (capability reads and writes, update stream)
//!     ↓                       ↓
//! InputSourceRegistry     DeviceSession (sky-tv-device)
//!     ↓                       ↓
//! KeyValueStore (sky-tv-persist-store)
//! ```
//!
//! The host drives an accessory through the [`Binding`] of each capability in
//! [`TelevisionAccessory::services`]; changes coming from the box arrive on
//! [`TelevisionAccessory::subscribe`].

pub mod accessory;
pub mod config;
pub mod error;
pub mod hap;
pub mod input;
pub mod logging;
pub mod platform;
pub mod plugin;

pub use accessory::{AccessoryContext, BridgeTelevisions, TelevisionAccessory};
pub use config::{DeviceConfig, PlatformConfig};
pub use error::{ConfigError, HapStatus, PlatformError, Result, TvError};
pub use hap::{
    AccessoryInformation, Active, Binding, Capability, Category, Characteristic,
    CharacteristicUpdate, CharacteristicValue, ServiceDescriptor, ServiceKind, VisibilityState,
};
pub use input::{InputKind, InputSource, InputSourceRegistry};
pub use platform::{accessory_uuid, AccessoryPlatform, Host, PlatformAccessory};
pub use plugin::{SkyTvPlugin, ACCESSORY_NAME, PLATFORM_NAME, PLUGIN_NAME};

pub use persist_store::KeyValueStore;
pub use sky_device::{DeviceClient, DeviceHandle, RemoteButton, SessionConfig};
