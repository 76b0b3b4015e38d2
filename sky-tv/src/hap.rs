//! The slice of the HomeKit accessory model a television accessory uses.
//!
//! Services are described as plain data: each [`ServiceDescriptor`] carries a
//! table of [`Capability`] entries, and each entry names the
//! [`Binding`] the host dispatches reads and writes through.

use std::fmt;

use sky_device::CachedDeviceInfo;

use crate::config::DeviceConfig;

/// Accessory category advertised by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Television = 31,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    AccessoryInformation,
    Television,
    InputSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    Name,
    Manufacturer,
    Model,
    SerialNumber,
    FirmwareRevision,
    HardwareRevision,
    Active,
    ActiveIdentifier,
    ConfiguredName,
    SleepDiscoveryMode,
    RemoteKey,
    Identifier,
    InputSourceType,
    InputDeviceType,
    IsConfigured,
    CurrentVisibilityState,
    TargetVisibilityState,
}

/// A characteristic value on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacteristicValue {
    Bool(bool),
    UInt(u32),
    Text(String),
}

impl CharacteristicValue {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            CharacteristicValue::UInt(v) => Some(*v),
            CharacteristicValue::Bool(b) => Some(u32::from(*b)),
            CharacteristicValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CharacteristicValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicValue::Bool(b) => write!(f, "{b}"),
            CharacteristicValue::UInt(v) => write!(f, "{v}"),
            CharacteristicValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<u32> for CharacteristicValue {
    fn from(v: u32) -> Self {
        CharacteristicValue::UInt(v)
    }
}

impl From<String> for CharacteristicValue {
    fn from(s: String) -> Self {
        CharacteristicValue::Text(s)
    }
}

impl From<&str> for CharacteristicValue {
    fn from(s: &str) -> Self {
        CharacteristicValue::Text(s.to_string())
    }
}

/// Generates the `u32` conversions for a HomeKit enumerated characteristic
macro_rules! hap_enum {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn from_u32(value: u32) -> Option<Self> {
                match value {
                    $(v if v == $value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl From<$name> for CharacteristicValue {
            fn from(v: $name) -> Self {
                CharacteristicValue::UInt(v as u32)
            }
        }
    };
}

hap_enum!(Active { Inactive = 0, Active = 1 });

hap_enum!(VisibilityState { Shown = 0, Hidden = 1 });

hap_enum!(SleepDiscoveryMode {
    NotDiscoverable = 0,
    AlwaysDiscoverable = 1,
});

hap_enum!(IsConfigured { NotConfigured = 0, Configured = 1 });

hap_enum!(InputSourceType {
    Other = 0,
    HomeScreen = 1,
    Tuner = 2,
    Hdmi = 3,
    CompositeVideo = 4,
    SVideo = 5,
    ComponentVideo = 6,
    Dvi = 7,
    AirPlay = 8,
    Usb = 9,
    Application = 10,
});

hap_enum!(InputDeviceType {
    Other = 0,
    Tv = 1,
    Recording = 2,
    Tuner = 3,
    Playback = 4,
    AudioSystem = 5,
});

impl Active {
    pub fn from_power(on: bool) -> Self {
        if on {
            Active::Active
        } else {
            Active::Inactive
        }
    }
}

impl VisibilityState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            VisibilityState::Shown
        } else {
            VisibilityState::Hidden
        }
    }
}

impl InputSourceType {
    /// Constant name as used in persisted input source subtypes
    pub fn constant_name(self) -> &'static str {
        match self {
            InputSourceType::Other => "OTHER",
            InputSourceType::HomeScreen => "HOME_SCREEN",
            InputSourceType::Tuner => "TUNER",
            InputSourceType::Hdmi => "HDMI",
            InputSourceType::CompositeVideo => "COMPOSITE_VIDEO",
            InputSourceType::SVideo => "S_VIDEO",
            InputSourceType::ComponentVideo => "COMPONENT_VIDEO",
            InputSourceType::Dvi => "DVI",
            InputSourceType::AirPlay => "AIRPLAY",
            InputSourceType::Usb => "USB",
            InputSourceType::Application => "APPLICATION",
        }
    }
}

impl InputDeviceType {
    pub fn constant_name(self) -> &'static str {
        match self {
            InputDeviceType::Other => "OTHER",
            InputDeviceType::Tv => "TV",
            InputDeviceType::Recording => "RECORDING",
            InputDeviceType::Tuner => "TUNER",
            InputDeviceType::Playback => "PLAYBACK",
            InputDeviceType::AudioSystem => "AUDIO_SYSTEM",
        }
    }
}

/// What a capability reads from and writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Fixed value, read-only
    Static(CharacteristicValue),
    Power,
    ActiveInput,
    TelevisionName,
    /// Write-only
    RemoteKey,
    InputName(u32),
    /// Read-only mirror of the persisted enabled flag
    InputCurrentVisibility(u32),
    InputTargetVisibility(u32),
}

impl Binding {
    pub fn readable(&self) -> bool {
        !matches!(self, Binding::RemoteKey)
    }

    pub fn writable(&self) -> bool {
        !matches!(self, Binding::Static(_) | Binding::InputCurrentVisibility(_))
    }
}

/// One entry in a service's capability table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub characteristic: Characteristic,
    pub binding: Binding,
}

impl Capability {
    pub fn new(characteristic: Characteristic, binding: Binding) -> Self {
        Self {
            characteristic,
            binding,
        }
    }

    pub fn fixed(characteristic: Characteristic, value: impl Into<CharacteristicValue>) -> Self {
        Self::new(characteristic, Binding::Static(value.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub kind: ServiceKind,
    pub name: String,
    /// Distinguishes services of the same kind on one accessory
    pub subtype: Option<String>,
    /// Subtypes of linked services
    pub linked: Vec<String>,
    pub capabilities: Vec<Capability>,
}

impl ServiceDescriptor {
    pub fn new(kind: ServiceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            subtype: None,
            linked: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn capability(&self, characteristic: Characteristic) -> Option<&Capability> {
        self.capabilities
            .iter()
            .find(|c| c.characteristic == characteristic)
    }
}

/// Pushed to subscribers whenever a characteristic changes without a host request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicUpdate {
    pub service: ServiceKind,
    pub subtype: Option<String>,
    pub characteristic: Characteristic,
    pub value: CharacteristicValue,
}

/// Identity shown in the accessory information service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInformation {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
    pub hardware_revision: Option<String>,
}

impl AccessoryInformation {
    pub const DEFAULT_MANUFACTURER: &'static str = "Sky";
    pub const DEFAULT_MODEL: &'static str = "Sky TV";

    /// Identity before anything has been learned from the box
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            manufacturer: config
                .manufacturer
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MANUFACTURER.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            serial_number: config
                .serial_number
                .clone()
                .unwrap_or_else(|| config.ip_address.clone()),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
            hardware_revision: None,
        }
    }

    pub fn apply(&mut self, info: &CachedDeviceInfo) {
        self.manufacturer = info.manufacturer.clone();
        self.model = info.model.clone();
        self.serial_number = info.serial_number.clone();
        self.firmware_revision = info.firmware_revision.clone();
    }

    /// Identity characteristics with a non-empty value
    pub fn fields(&self) -> Vec<(Characteristic, String)> {
        [
            (Characteristic::Manufacturer, Some(&self.manufacturer)),
            (Characteristic::Model, Some(&self.model)),
            (Characteristic::SerialNumber, Some(&self.serial_number)),
            (Characteristic::FirmwareRevision, Some(&self.firmware_revision)),
            (Characteristic::HardwareRevision, self.hardware_revision.as_ref()),
        ]
        .into_iter()
        .filter_map(|(c, v)| v.filter(|v| !v.is_empty()).map(|v| (c, v.clone())))
        .collect()
    }

    pub fn service(&self) -> ServiceDescriptor {
        let mut service = ServiceDescriptor::new(ServiceKind::AccessoryInformation, &self.name);
        service
            .capabilities
            .push(Capability::fixed(Characteristic::Name, self.name.as_str()));
        service.capabilities.extend(
            self.fields()
                .into_iter()
                .map(|(c, v)| Capability::fixed(c, v)),
        );
        service
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_values() {
        assert_eq!(Active::from_u32(1), Some(Active::Active));
        assert_eq!(Active::from_u32(2), None);
        assert_eq!(VisibilityState::from_u32(1), Some(VisibilityState::Hidden));
        assert_eq!(
            CharacteristicValue::from(SleepDiscoveryMode::AlwaysDiscoverable),
            CharacteristicValue::UInt(1)
        );
        assert_eq!(InputSourceType::Hdmi as u32, 3);
        assert_eq!(InputDeviceType::Tuner as u32, 3);
    }

    #[test]
    fn test_bool_reads_as_u32() {
        assert_eq!(CharacteristicValue::Bool(true).as_u32(), Some(1));
        assert_eq!(CharacteristicValue::Text("1".into()).as_u32(), None);
    }

    #[test]
    fn test_information_defaults_and_cache() {
        let config = DeviceConfig::new("Lounge", "192.168.1.50");
        let mut info = AccessoryInformation::from_config(&config);
        assert_eq!(info.manufacturer, "Sky");
        assert_eq!(info.serial_number, "192.168.1.50");

        info.apply(&CachedDeviceInfo {
            manufacturer: "Sky".to_string(),
            model: "ES240".to_string(),
            serial_number: "0629".to_string(),
            firmware_revision: String::new(),
        });

        let fields = info.fields();
        assert!(fields.contains(&(Characteristic::Model, "ES240".to_string())));
        assert!(!fields.iter().any(|(c, _)| *c == Characteristic::FirmwareRevision));
        assert!(!fields.iter().any(|(c, _)| *c == Characteristic::HardwareRevision));
    }

    #[test]
    fn test_binding_access() {
        assert!(!Binding::RemoteKey.readable());
        assert!(Binding::RemoteKey.writable());
        assert!(!Binding::InputCurrentVisibility(1).writable());
        assert!(!Binding::Static(CharacteristicValue::UInt(0)).writable());
        assert!(Binding::InputTargetVisibility(1).writable());
    }
}
