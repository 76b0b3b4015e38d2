//! Boundary to the library that actually talks to the box.
//!
//! Two halves: key presses go to the box's remote-control port by address and
//! work whether or not a session is up, while power queries, channel changes
//! and state notifications need a discovered [`DeviceHandle`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ClientError;

/// What the box reports each time the tuned channel or standby state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Channel number currently tuned, if the box is on a channel
    pub channel_id: Option<u32>,
    pub standby: bool,
}

/// Identity the box reports on discovery
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceIdentity {
    pub model: String,
    pub serial: String,
    pub software: String,
}

/// Stream of state snapshots. An `Err` item or the end of the stream means
/// the connection is gone.
pub type StateStream = BoxStream<'static, Result<StateSnapshot, ClientError>>;

#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Find and handshake with the box at `address`
    async fn discover(&self, address: &str) -> Result<Arc<dyn DeviceHandle>, ClientError>;

    /// Send a named remote key to the box at `address`
    async fn press_key(&self, address: &str, key: &str) -> Result<(), ClientError>;
}

/// A discovered, connected box
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    fn identity(&self) -> DeviceIdentity;

    /// `true` when the box is out of standby
    async fn check_power(&self) -> Result<bool, ClientError>;

    /// Tune to a channel given as an `xsi://` URI
    async fn set_channel(&self, uri: &str) -> Result<(), ClientError>;

    /// Subscribe to state changes
    fn state_changes(&self) -> StateStream;
}
