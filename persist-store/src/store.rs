//! Per-device cached view over a [`StorageBackend`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backend::{Document, JsonFileBackend, MemoryBackend, StorageBackend};
use crate::error::{Result, StoreError};

/// Cached state for one device key
struct Entry {
    key: String,
    /// `None` until the backing document has been read once
    document: Mutex<Option<Document>>,
    /// Held across read-modify-write and flush so concurrent `set`s never lose updates
    write_gate: tokio::sync::Mutex<()>,
}

impl Entry {
    fn new(key: String) -> Self {
        Self {
            key,
            document: Mutex::new(None),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn install(&self, loaded: Option<Document>) {
        let mut document = self.document.lock();
        if document.is_none() {
            *document = Some(loaded.unwrap_or_default());
        }
    }

    async fn ensure_loaded(&self, backend: &dyn StorageBackend) -> Result<()> {
        if self.document.lock().is_some() {
            return Ok(());
        }
        let loaded = backend.load(&self.key).await?;
        tracing::debug!(key = %self.key, found = loaded.is_some(), "Loaded document");
        self.install(loaded);
        Ok(())
    }

    fn ensure_loaded_sync(&self, backend: &dyn StorageBackend) -> Result<()> {
        if self.document.lock().is_some() {
            return Ok(());
        }
        let loaded = backend.load_sync(&self.key)?;
        tracing::debug!(key = %self.key, found = loaded.is_some(), "Loaded document (sync)");
        self.install(loaded);
        Ok(())
    }

    fn field(&self, field: &str) -> Option<Value> {
        self.document
            .lock()
            .as_ref()
            .and_then(|document| document.get(field).cloned())
    }
}

/// Key/value store holding one JSON document per device key.
///
/// Each document is read from the backend the first time any of its fields is
/// requested and kept in memory afterwards. Every `set` writes the whole
/// document back before returning.
///
/// # Example
///
/// ```rust,ignore
/// let store = KeyValueStore::json_files("/var/lib/homebridge/persist");
/// store.set("sky-tv.TV.Lounge.json", "ConfiguredName", &"Lounge TV").await?;
/// let name: Option<String> = store.get("sky-tv.TV.Lounge.json", "ConfiguredName").await?;
/// ```
#[derive(Clone)]
pub struct KeyValueStore {
    backend: Arc<dyn StorageBackend>,
    entries: Arc<Mutex<HashMap<String, Arc<Entry>>>>,
}

impl KeyValueStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Store backed by one file per device key in `dir`
    pub fn json_files(dir: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Arc::new(JsonFileBackend::new(dir)))
    }

    /// Store that forgets everything when dropped
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Scoped handle for one device key.
    ///
    /// Handles for the same key share their cache and write serialization.
    pub fn device(&self, key: impl Into<String>) -> DeviceStore {
        let key = key.into();
        let entry = Arc::clone(
            self.entries
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Entry::new(key))),
        );
        DeviceStore {
            entry,
            backend: Arc::clone(&self.backend),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, device_key: &str, field: &str) -> Result<Option<T>> {
        self.device(device_key).get(field).await
    }

    pub fn get_cached<T: DeserializeOwned>(&self, device_key: &str, field: &str) -> Result<Option<T>> {
        self.device(device_key).get_cached(field)
    }

    pub async fn set<T: Serialize + ?Sized>(&self, device_key: &str, field: &str, value: &T) -> Result<()> {
        self.device(device_key).set(field, value).await
    }
}

/// A [`KeyValueStore`] scoped to a single device key
#[derive(Clone)]
pub struct DeviceStore {
    entry: Arc<Entry>,
    backend: Arc<dyn StorageBackend>,
}

impl DeviceStore {
    /// The device key this handle reads and writes
    pub fn key(&self) -> &str {
        &self.entry.key
    }

    /// Raw JSON value of `field`, loading the document if needed
    pub async fn get_value(&self, field: &str) -> Result<Option<Value>> {
        self.entry.ensure_loaded(self.backend.as_ref()).await?;
        Ok(self.entry.field(field))
    }

    /// Synchronous [`get_value`](Self::get_value). Only meant for construction,
    /// before async I/O is acceptable.
    pub fn get_value_cached(&self, field: &str) -> Result<Option<Value>> {
        self.entry.ensure_loaded_sync(self.backend.as_ref())?;
        Ok(self.entry.field(field))
    }

    pub async fn get<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>> {
        let value = self.get_value(field).await?;
        self.decode(field, value)
    }

    pub fn get_cached<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>> {
        let value = self.get_value_cached(field)?;
        self.decode(field, value)
    }

    /// Set `field` and flush the whole document.
    ///
    /// Calls on the same device key are applied one at a time against the
    /// latest in-memory document. The cache only takes the new value once the
    /// backend has saved it.
    pub async fn set<T: Serialize + ?Sized>(&self, field: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|source| self.field_error(field, source))?;

        let _gate = self.entry.write_gate.lock().await;
        self.entry.ensure_loaded(self.backend.as_ref()).await?;

        let mut snapshot = self.entry.document.lock().clone().unwrap_or_default();
        snapshot.insert(field.to_string(), value);

        if let Err(e) = self.backend.save(&self.entry.key, &snapshot).await {
            tracing::warn!(key = %self.entry.key, field, error = %e, "Failed to flush document");
            return Err(e);
        }
        *self.entry.document.lock() = Some(snapshot);
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, field: &str, value: Option<Value>) -> Result<Option<T>> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| self.field_error(field, source)),
        }
    }

    fn field_error(&self, field: &str, source: serde_json::Error) -> StoreError {
        StoreError::Field {
            key: self.entry.key.clone(),
            field: field.to_string(),
            source,
        }
    }
}

impl std::fmt::Debug for DeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStore").field("key", &self.entry.key).finish()
    }
}
