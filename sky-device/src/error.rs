//! Error types for the sky-device crate.

/// Opaque failure reported by the device client.
///
/// The session never inspects these beyond logging them; they are surfaced
/// to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The box did not answer discovery or the handshake
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    /// The box answered but refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Any other transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A remote button the key map has no vendor key name for
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported remote key {0}")]
pub struct UnsupportedKey(pub u8);

/// Errors from [`DeviceSession`](crate::DeviceSession) operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No live connection to the box
    #[error("No connection to {device}")]
    ServiceUnavailable { device: String },

    /// A keypress, channel change or power query failed in transport
    #[error("{operation} failed on {device}: {source}")]
    DeviceCommandFailed {
        device: String,
        operation: String,
        #[source]
        source: ClientError,
    },

    /// The session was shut down before a connection was established
    #[error("Session for {device} has been shut down")]
    ShutDown { device: String },
}

impl SessionError {
    pub(crate) fn command(device: &str, operation: impl Into<String>, source: ClientError) -> Self {
        Self::DeviceCommandFailed {
            device: device.to_string(),
            operation: operation.into(),
            source,
        }
    }
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
