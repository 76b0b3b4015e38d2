//! Plugin entry: what the host registers and constructs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use persist_store::KeyValueStore;
use sky_device::{DeviceClient, SessionConfig};

use crate::accessory::{AccessoryContext, BridgeTelevisions, TelevisionAccessory};
use crate::config::{DeviceConfig, PlatformConfig};
use crate::error::Result;
use crate::platform::{AccessoryPlatform, Host};

pub const PLUGIN_NAME: &str = "sky-tv";
/// Name the standalone accessory is registered under
pub const ACCESSORY_NAME: &str = "TV";
/// Name the platform is registered under
pub const PLATFORM_NAME: &str = "TVs";

/// Owns the collaborators shared by everything the plugin constructs
pub struct SkyTvPlugin {
    context: AccessoryContext,
    standalone: BridgeTelevisions,
    /// One store per persistence directory, so every accessory writing a
    /// file goes through the same cache and write gate
    stores: Mutex<HashMap<PathBuf, KeyValueStore>>,
}

impl SkyTvPlugin {
    /// Persist to JSON files under `persist_dir`
    pub fn new(persist_dir: impl Into<PathBuf>, client: Arc<dyn DeviceClient>) -> Self {
        let persist_dir = persist_dir.into();
        let store = KeyValueStore::json_files(persist_dir.clone());
        let plugin = Self::with_store(store.clone(), client);
        plugin.stores.lock().insert(persist_dir, store);
        plugin
    }

    /// Persist where the platform block says, or under the user data directory
    pub fn for_platform(config: &PlatformConfig, client: Arc<dyn DeviceClient>) -> Self {
        Self::new(config.persist_dir(), client)
    }

    pub fn with_store(store: KeyValueStore, client: Arc<dyn DeviceClient>) -> Self {
        Self {
            context: AccessoryContext::new(store, client),
            standalone: BridgeTelevisions::new(),
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.context.session = config;
        self
    }

    pub fn context(&self) -> &AccessoryContext {
        &self.context
    }

    /// Build a standalone `TV` accessory on the host's bridge
    pub fn accessory(&self, config: DeviceConfig) -> Result<TelevisionAccessory> {
        TelevisionAccessory::new(config, &self.context, Some(&self.standalone))
    }

    /// Standalone televisions created so far
    pub fn standalone_count(&self) -> usize {
        self.standalone.count()
    }

    /// Build the `TVs` platform.
    ///
    /// A `persist_path` in the platform block takes precedence over the
    /// plugin's own store.
    pub fn platform(&self, config: PlatformConfig, host: Arc<dyn Host>) -> AccessoryPlatform {
        let mut context = self.context.clone();
        if let Some(path) = &config.persist_path {
            tracing::debug!(path = %path.display(), "Using platform persistence directory");
            context.store = self.store_for(path);
        }
        AccessoryPlatform::new(config, context, host)
    }

    fn store_for(&self, dir: &Path) -> KeyValueStore {
        self.stores
            .lock()
            .entry(dir.to_path_buf())
            .or_insert_with(|| KeyValueStore::json_files(dir))
            .clone()
    }
}
