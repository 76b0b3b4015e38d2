//! Storage backends holding one JSON document per device key.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::{Result, StoreError};

/// A flat mapping from field name to JSON value
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Whole-document persistence keyed by device key.
///
/// Backends never merge: `save` replaces whatever was stored under the key.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Load the document for `key`, or `None` if nothing has been stored yet
    async fn load(&self, key: &str) -> Result<Option<Document>>;

    /// Blocking variant of [`load`](Self::load), for use during construction
    fn load_sync(&self, key: &str) -> Result<Option<Document>>;

    /// Replace the document for `key`. Durable once this returns.
    async fn save(&self, key: &str, document: &Document) -> Result<()>;
}

/// Serialize a document the way existing state files are laid out:
/// 4-space indentation and a trailing newline.
pub fn encode(document: &Document) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    document.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Stores each document as `<dir>/<key>`.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Create a backend rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the documents live in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key == "."
            || key == ".."
            || key.contains(|c: char| c == '/' || c == '\\' || c == '\0')
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }

    fn decode(key: &str, contents: &str) -> Result<Document> {
        serde_json::from_str(contents).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })
    }
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    async fn load(&self, key: &str) -> Result<Option<Document>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::decode(key, &contents).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn load_sync(&self, key: &str) -> Result<Option<Document>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::decode(key, &contents).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn save(&self, key: &str, document: &Document) -> Result<()> {
        let path = self.path_for(key)?;
        let bytes = encode(document).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        // Write then rename so a crash never leaves a truncated document
        let tmp = path.with_file_name(format!("{key}.tmp"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })?;

        tracing::trace!(key, bytes = bytes.len(), "Flushed document");
        Ok(())
    }
}

/// Keeps documents in process memory. Used by tests and for throwaway state.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<String, Document>>,
    saves: Mutex<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of what is currently stored under `key`
    pub fn document(&self, key: &str) -> Option<Document> {
        self.documents.lock().get(key).cloned()
    }

    /// Seed a document as if it had been written by an earlier run
    pub fn insert(&self, key: impl Into<String>, document: Document) {
        self.documents.lock().insert(key.into(), document);
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<Document>> {
        self.load_sync(key)
    }

    fn load_sync(&self, key: &str) -> Result<Option<Document>> {
        Ok(self.document(key))
    }

    async fn save(&self, key: &str, document: &Document) -> Result<()> {
        self.documents
            .lock()
            .insert(key.to_string(), document.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_encode_uses_four_space_indent_and_trailing_newline() {
        let bytes = encode(&doc(json!({"ConfiguredName": "Lounge"}))).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\n    \"ConfiguredName\": \"Lounge\"\n}\n"
        );
    }

    #[test]
    fn test_encode_nested_objects() {
        let bytes = encode(&doc(json!({"a": {"b": true}}))).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\n    \"a\": {\n        \"b\": true\n    }\n}\n"
        );
    }

    #[test]
    fn test_path_for_rejects_separators() {
        let backend = JsonFileBackend::new("/tmp/persist");
        assert!(matches!(
            backend.path_for("../escape"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(backend.path_for(""), Err(StoreError::InvalidKey(_))));
        assert!(matches!(backend.path_for(".."), Err(StoreError::InvalidKey(_))));
        assert_eq!(
            backend.path_for("sky-tv.TV.Lounge.json").unwrap(),
            PathBuf::from("/tmp/persist/sky-tv.TV.Lounge.json")
        );
    }

    #[tokio::test]
    async fn test_file_backend_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path());
        assert!(backend.load("nothing.json").await.unwrap().is_none());
        assert!(backend.load_sync("nothing.json").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_backend_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("nested"));
        let document = doc(json!({"InputSource.Channel.101.Enabled": false}));

        backend.save("tv.json", &document).await.unwrap();

        assert_eq!(backend.load("tv.json").await.unwrap(), Some(document.clone()));
        assert_eq!(backend.load_sync("tv.json").unwrap(), Some(document));
        assert!(!dir.path().join("nested").join("tv.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_backend_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "[1, 2]").unwrap();
        let backend = JsonFileBackend::new(dir.path());

        assert!(matches!(
            backend.load("bad.json").await,
            Err(StoreError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_backend_counts_saves() {
        let backend = MemoryBackend::new();
        backend.save("k", &Document::new()).await.unwrap();
        backend.save("k", &Document::new()).await.unwrap();
        assert_eq!(backend.save_count(), 2);
        assert_eq!(backend.document("k"), Some(Document::new()));
    }
}
