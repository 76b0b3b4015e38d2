//! Selectable inputs: the home screen, then one per configured channel.

use indexmap::IndexMap;
use persist_store::DeviceStore;
use sky_device::names;

use crate::error::{Result, TvError};
use crate::hap::{InputDeviceType, InputSourceType, VisibilityState};

/// What selecting an input does on the box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Press a remote key
    HomeScreen { key: &'static str },
    /// Tune to a channel number
    Channel(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    /// Position in registration order; also the host's active-input value
    pub identifier: u32,
    /// Stable string id used for persistence and service linking
    pub subtype: String,
    pub kind: InputKind,
    pub source_type: InputSourceType,
    pub device_type: Option<InputDeviceType>,
    pub default_name: String,
    /// Always shown; no visibility toggle is offered
    pub always_enabled: bool,
}

impl InputSource {
    pub fn channel_number(&self) -> Option<u32> {
        match self.kind {
            InputKind::Channel(number) => Some(number),
            InputKind::HomeScreen { .. } => None,
        }
    }

    fn name_field(&self) -> String {
        format!("InputSource.{}.ConfiguredName", self.subtype)
    }

    fn enabled_field(&self) -> String {
        format!("InputSource.{}.Enabled", self.subtype)
    }
}

/// Input sources of one accessory, indexed by identifier.
///
/// Built once; the order never changes afterwards.
#[derive(Debug)]
pub struct InputSourceRegistry {
    device: String,
    sources: Vec<InputSource>,
    store: DeviceStore,
}

impl InputSourceRegistry {
    pub fn new(device: impl Into<String>, channels: &IndexMap<u32, String>, store: DeviceStore) -> Self {
        let mut registry = Self {
            device: device.into(),
            sources: Vec::with_capacity(channels.len() + 1),
            store,
        };

        registry.push(
            InputKind::HomeScreen { key: names::HOME },
            InputSourceType::Hdmi,
            Some(InputDeviceType::Other),
            "Home",
            true,
        );
        for (number, name) in channels {
            registry.push(
                InputKind::Channel(*number),
                InputSourceType::Hdmi,
                Some(InputDeviceType::Tuner),
                name,
                false,
            );
        }
        registry
    }

    fn push(
        &mut self,
        kind: InputKind,
        source_type: InputSourceType,
        device_type: Option<InputDeviceType>,
        name: &str,
        always_enabled: bool,
    ) {
        let subtype = match kind {
            InputKind::Channel(number) => format!("Channel.{number}"),
            InputKind::HomeScreen { .. } => match device_type {
                Some(device_type) => format!(
                    "{}.{}.{}",
                    source_type.constant_name(),
                    device_type.constant_name(),
                    name
                ),
                None => format!("{}.{}", source_type.constant_name(), name),
            },
        };

        self.sources.push(InputSource {
            identifier: self.sources.len() as u32,
            subtype,
            kind,
            source_type,
            device_type,
            default_name: name.to_string(),
            always_enabled,
        });
    }

    pub fn sources(&self) -> &[InputSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The home screen entry, always identifier 0
    pub fn home(&self) -> &InputSource {
        &self.sources[0]
    }

    pub fn resolve(&self, identifier: u32) -> Result<&InputSource> {
        self.sources
            .get(identifier as usize)
            .ok_or_else(|| TvError::UnknownInput {
                device: self.device.clone(),
                identifier,
            })
    }

    pub fn find_by_channel(&self, channel_id: u32) -> Option<&InputSource> {
        self.sources
            .iter()
            .find(|source| source.kind == InputKind::Channel(channel_id))
    }

    /// Identifier the host should show as active for the tuned channel
    pub fn active_identifier(&self, channel_id: Option<u32>) -> u32 {
        channel_id
            .and_then(|channel| self.find_by_channel(channel))
            .unwrap_or_else(|| self.home())
            .identifier
    }

    pub async fn configured_name(&self, identifier: u32) -> Result<String> {
        let source = self.resolve(identifier)?;
        let stored: Option<String> = self.store.get(&source.name_field()).await?;
        Ok(stored.unwrap_or_else(|| source.default_name.clone()))
    }

    /// Synchronous read for building the initial service values
    pub fn configured_name_cached(&self, identifier: u32) -> Result<String> {
        let source = self.resolve(identifier)?;
        let stored: Option<String> = self.store.get_cached(&source.name_field())?;
        Ok(stored.unwrap_or_else(|| source.default_name.clone()))
    }

    pub async fn set_configured_name(&self, identifier: u32, name: &str) -> Result<()> {
        let source = self.resolve(identifier)?;
        tracing::info!(
            device = %self.device,
            "Setting configured name for input source {:?}: {}",
            source.subtype,
            name
        );
        self.store.set(&source.name_field(), name).await?;
        Ok(())
    }

    /// Persisted enabled flag; anything but a stored `false` counts as enabled
    pub async fn is_enabled(&self, identifier: u32) -> Result<bool> {
        let source = self.resolve(identifier)?;
        if source.always_enabled {
            return Ok(true);
        }
        let stored = self.store.get_value(&source.enabled_field()).await?;
        Ok(stored.and_then(|v| v.as_bool()).unwrap_or(true))
    }

    pub fn is_enabled_cached(&self, identifier: u32) -> Result<bool> {
        let source = self.resolve(identifier)?;
        if source.always_enabled {
            return Ok(true);
        }
        let stored = self.store.get_value_cached(&source.enabled_field())?;
        Ok(stored.and_then(|v| v.as_bool()).unwrap_or(true))
    }

    pub async fn visibility(&self, identifier: u32) -> Result<VisibilityState> {
        self.is_enabled(identifier)
            .await
            .map(VisibilityState::from_enabled)
    }

    pub async fn set_enabled(&self, identifier: u32, enabled: bool) -> Result<()> {
        let source = self.resolve(identifier)?;
        if source.always_enabled {
            return Err(TvError::NotTogglable {
                device: self.device.clone(),
                identifier,
            });
        }
        tracing::info!(
            device = %self.device,
            "Setting enabled for input source {:?}: {}",
            source.subtype,
            enabled
        );
        self.store.set(&source.enabled_field(), &enabled).await?;
        Ok(())
    }
}
