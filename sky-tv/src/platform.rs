//! The `TVs` platform: builds one accessory per configured box and decides
//! which are published on the bridge and which get their own HAP server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::accessory::{AccessoryContext, BridgeTelevisions, TelevisionAccessory};
use crate::config::PlatformConfig;
use crate::error::PlatformError;
use crate::hap::{Category, ServiceDescriptor};

/// Host operations the platform needs besides returning its bridge list
#[async_trait]
pub trait Host: Send + Sync {
    /// Publish accessories on their own HAP servers
    async fn publish_external_accessories(
        &self,
        accessories: Vec<PlatformAccessory>,
    ) -> Result<(), String>;
}

/// An accessory in the form the host publishes
#[derive(Debug, Clone)]
pub struct PlatformAccessory {
    pub display_name: String,
    pub uuid: Uuid,
    pub category: Category,
    pub services: Vec<ServiceDescriptor>,
    pub accessory: TelevisionAccessory,
}

impl PlatformAccessory {
    pub fn from_accessory(accessory: TelevisionAccessory) -> Self {
        Self {
            display_name: accessory.name().to_string(),
            uuid: accessory_uuid(accessory.name()),
            category: Category::Television,
            services: accessory.services(),
            accessory,
        }
    }
}

/// Stable UUID for the accessory named `name`
pub fn accessory_uuid(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("sky-tv.TV:{name}").as_bytes())
}

pub struct AccessoryPlatform {
    config: PlatformConfig,
    context: AccessoryContext,
    host: Arc<dyn Host>,
    bridge: BridgeTelevisions,
    loaded: AtomicBool,
    accessories: Mutex<Vec<TelevisionAccessory>>,
}

impl AccessoryPlatform {
    pub fn new(config: PlatformConfig, context: AccessoryContext, host: Arc<dyn Host>) -> Self {
        Self {
            config,
            context,
            host,
            bridge: BridgeTelevisions::new(),
            loaded: AtomicBool::new(false),
            accessories: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Accessories for the host's bridge.
    ///
    /// Any failure is logged and yields an empty list, so nothing is published
    /// partially.
    pub async fn accessories(&self) -> Vec<PlatformAccessory> {
        match self.get_accessories().await {
            Ok(accessories) => accessories,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build accessory list");
                Vec::new()
            }
        }
    }

    /// Build every configured accessory, publish the external ones and return
    /// the bridge ones. May only be called once.
    pub async fn get_accessories(&self) -> Result<Vec<PlatformAccessory>, PlatformError> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Err(PlatformError::AlreadyLoaded);
        }
        self.config.validate()?;

        let mut built = Vec::with_capacity(self.config.tvs.len());
        for tv in &self.config.tvs {
            let external = tv.is_external(self.config.external);
            let bridge = (!external).then_some(&self.bridge);
            // Accessories built so far stop when `built` is dropped
            let accessory = TelevisionAccessory::new(tv.clone(), &self.context, bridge).map_err(
                |source| PlatformError::Accessory {
                    name: tv.name.clone(),
                    source,
                },
            )?;
            built.push((external, accessory));
        }

        *self.accessories.lock() = built.iter().map(|(_, accessory)| accessory.clone()).collect();

        let (external, local): (Vec<_>, Vec<_>) = built.into_iter().partition(|(external, _)| *external);
        let external: Vec<PlatformAccessory> = external
            .into_iter()
            .map(|(_, accessory)| PlatformAccessory::from_accessory(accessory))
            .collect();
        let local: Vec<PlatformAccessory> = local
            .into_iter()
            .map(|(_, accessory)| PlatformAccessory::from_accessory(accessory))
            .collect();

        tracing::info!(
            bridge = local.len(),
            external = external.len(),
            "Loaded {} TV accessories",
            local.len() + external.len()
        );

        if !external.is_empty() {
            if let Err(e) = self.host.publish_external_accessories(external).await {
                self.shutdown();
                return Err(PlatformError::Host(e));
            }
        }

        Ok(local)
    }

    /// Televisions registered on the local bridge
    pub fn bridge_television_count(&self) -> usize {
        self.bridge.count()
    }

    /// Every accessory built by this platform, bridge and external
    pub fn loaded_accessories(&self) -> Vec<TelevisionAccessory> {
        self.accessories.lock().clone()
    }

    pub fn shutdown(&self) {
        for accessory in self.accessories.lock().drain(..) {
            accessory.shutdown();
        }
    }
}

impl Drop for AccessoryPlatform {
    fn drop(&mut self) {
        self.shutdown();
    }
}
