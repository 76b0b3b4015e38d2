//! Per-device JSON persistence
//!
//! Each accessory keeps a handful of user-configurable values (friendly names,
//! input visibility, the last identity learned from the box) in a single flat
//! JSON document. This crate wraps a whole-document backend behind a cached
//! get/set interface scoped per device key.
//!
//! ```text
//! KeyValueStore
//!     │
//!     ├── entries: HashMap<device key, Entry>
//!     │       │
//!     │       └── Entry: cached Document + write gate
//!     │
//!     └── backend: dyn StorageBackend
//!             ├── JsonFileBackend  (<dir>/<key>, 4-space JSON + newline)
//!             └── MemoryBackend
//! ```

pub mod backend;
pub mod error;
pub mod store;

pub use backend::{encode, Document, JsonFileBackend, MemoryBackend, StorageBackend};
pub use error::{Result, StoreError};
pub use store::{DeviceStore, KeyValueStore};
