//! # Sky set-top box session
//!
//! Owns the connection to one box and the remote-control vocabulary used to
//! drive it:
//!
//! - [`DeviceClient`] / [`DeviceHandle`]: the boundary to the library that
//!   speaks the box's protocols
//! - [`RemoteKeyMap`]: HomeKit remote buttons to vendor key names
//! - [`DeviceSession`]: connect-with-retry, power and channel state, key
//!   presses, and the channel-change recovery sequence
//!
//! ```rust,ignore
//! let session = DeviceSession::new("Lounge", "192.168.1.50", client, store.device(key), SessionConfig::default());
//! session.start();                       // background retry loop, returns immediately
//! let mut events = session.subscribe();  // Connected / StateChanged / Disconnected
//! session.set_channel(101).await?;       // xsi://65
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod keys;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use client::{DeviceClient, DeviceHandle, DeviceIdentity, StateSnapshot, StateStream};
pub use config::SessionConfig;
pub use error::{ClientError, Result, SessionError, UnsupportedKey};
pub use identity::CachedDeviceInfo;
pub use keys::{names, RemoteButton, RemoteKeyMap};
pub use session::{channel_uri, ConnectionState, DeviceSession, SessionEvent};
