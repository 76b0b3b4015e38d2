//! Error types for the sky-tv crate.

use std::path::PathBuf;

use persist_store::StoreError;
use sky_device::{ClientError, SessionError};

use crate::hap::{Characteristic, CharacteristicValue};

/// Status codes reported back to the HomeKit controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapStatus {
    ServiceCommunicationFailure = -70402,
    ReadOnlyCharacteristic = -70404,
    WriteOnlyCharacteristic = -70405,
    ResourceDoesNotExist = -70409,
    InvalidValueInRequest = -70410,
}

/// Errors from television accessory operations
#[derive(Debug, thiserror::Error)]
pub enum TvError {
    /// No live connection to the box
    #[error("{device} is not connected")]
    ServiceUnavailable { device: String },

    /// Active-input identifier outside the registry
    #[error("Unknown input identifier {identifier} for {device}")]
    UnknownInput { device: String, identifier: u32 },

    /// Remote button with no vendor key name
    #[error("Unsupported remote key {code} for {device}")]
    UnsupportedKey { device: String, code: u8 },

    /// Always-enabled input sources cannot be hidden
    #[error("Input {identifier} on {device} cannot be hidden")]
    NotTogglable { device: String, identifier: u32 },

    /// Transport failure from a keypress, channel change or power query
    #[error("{operation} failed on {device}: {source}")]
    DeviceCommandFailed {
        device: String,
        operation: String,
        #[source]
        source: ClientError,
    },

    #[error("Invalid value {value:?} for {characteristic:?}")]
    InvalidValue {
        characteristic: Characteristic,
        value: CharacteristicValue,
    },

    #[error("{0:?} is read-only")]
    ReadOnly(Characteristic),

    #[error("{0:?} is write-only")]
    WriteOnly(Characteristic),

    /// Accessories spawn background tasks and need a Tokio runtime
    #[error("Accessories must be created from within a Tokio runtime")]
    NoRuntime,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<SessionError> for TvError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::ServiceUnavailable { device } | SessionError::ShutDown { device } => {
                TvError::ServiceUnavailable { device }
            }
            SessionError::DeviceCommandFailed {
                device,
                operation,
                source,
            } => TvError::DeviceCommandFailed {
                device,
                operation,
                source,
            },
        }
    }
}

impl TvError {
    /// Status to report to the controller for this error
    pub fn hap_status(&self) -> HapStatus {
        match self {
            TvError::ServiceUnavailable { .. }
            | TvError::DeviceCommandFailed { .. }
            | TvError::NoRuntime
            | TvError::Store(_) => HapStatus::ServiceCommunicationFailure,
            TvError::UnknownInput { .. } => HapStatus::ResourceDoesNotExist,
            TvError::UnsupportedKey { .. }
            | TvError::InvalidValue { .. } => HapStatus::InvalidValueInRequest,
            TvError::NotTogglable { .. } | TvError::ReadOnly(_) => HapStatus::ReadOnlyCharacteristic,
            TvError::WriteOnly(_) => HapStatus::WriteOnlyCharacteristic,
        }
    }
}

/// Errors in the plugin configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TV #{index} has no name")]
    EmptyName { index: usize },

    #[error("TV {name} has no ip_address")]
    MissingAddress { name: String },

    #[error("More than one TV is named {0}")]
    DuplicateName(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while building the platform's accessory list
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Accessories can only be requested once")]
    AlreadyLoaded,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to create accessory {name}: {source}")]
    Accessory {
        name: String,
        #[source]
        source: TvError,
    },

    #[error("Host rejected external accessories: {0}")]
    Host(String),
}

/// Result type for accessory operations
pub type Result<T> = std::result::Result<T, TvError>;
