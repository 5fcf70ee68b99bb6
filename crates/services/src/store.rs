//! Persistent key-value store.
//!
//! Holds the API key, conversation history, context items and the transient
//! pending-question record. Values are JSON; every write or removal emits a
//! [`StoreChange`] to subscribers so an open panel can react.
//!
//! Two backends:
//! - [`MemoryStore`] for tests and ephemeral sessions
//! - [`JsonFileStore`] which keeps the whole map in one JSON file

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use shared::events::StoreChange;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex};

/// Buffered change notifications per subscriber
const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store value for '{key}' is malformed: {source}")]
    Malformed {
        key: String,
        source: serde_json::Error,
    },

    #[error("Store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable storage keyed by string names
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a raw value; `None` when the key is absent
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Write several keys at once, then notify subscribers
    async fn set_many(&self, entries: Vec<(String, Value)>) -> StoreResult<()>;

    /// Remove keys (absent keys are ignored), then notify subscribers
    async fn remove(&self, keys: &[&str]) -> StoreResult<()>;

    /// Receive a notification after every write or removal
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Typed helpers over any [`KeyValueStore`]
#[async_trait]
pub trait StoreExt: KeyValueStore {
    async fn get_as<T>(&self, key: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Malformed {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    async fn set_as<T>(&self, key: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.set_many(vec![(key.to_string(), value)]).await
    }
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {}

/// In-memory store; contents vanish with the process
pub struct MemoryStore {
    values: RwLock<Map<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: RwLock::new(Map::new()),
            changes,
        }
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StoreResult<()> {
        let keys: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();
        {
            let mut values = self.values.write();
            for (key, value) in entries {
                values.insert(key, value);
            }
        }
        notify(&self.changes, keys);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        {
            let mut values = self.values.write();
            for key in keys {
                values.remove(*key);
            }
        }
        notify(&self.changes, keys.iter().map(|k| k.to_string()).collect());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

/// Store backed by a single JSON object on disk.
///
/// The file is the only copy: every read loads it, and every mutation is a
/// read-modify-write under `write_lock`, finished by writing a sibling temp
/// file and renaming it over the original. Several processes may share one
/// path; change notifications only reach subscribers of this instance.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    /// Open (or create) the store file at `path`
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let values = read_map(&path).await?;
        tracing::debug!(path = %path.display(), keys = values.len(), "opened store");

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            changes,
        })
    }

    /// Default location: `<platform data dir>/store.json`
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com.local", "Page Buddy", "PageBuddy")
            .map(|p| p.data_dir().join("store.json"))
            .unwrap_or_else(|| PathBuf::from("./store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mutate` to the current file contents and write the result back
    async fn update<F>(&self, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Map<String, Value>) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut values = read_map(&self.path).await?;
        mutate(&mut values);

        let snapshot = serde_json::to_vec_pretty(&values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, snapshot).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Load the whole map; a missing or empty file is an empty store
async fn read_map(path: &Path) -> StoreResult<Map<String, Value>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if text.trim().is_empty() => Ok(Map::new()),
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut values = read_map(&self.path).await?;
        Ok(values.remove(key))
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StoreResult<()> {
        let keys: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();
        self.update(|values| {
            for (key, value) in entries {
                values.insert(key, value);
            }
        })
        .await?;
        tracing::debug!(?keys, "store write");
        notify(&self.changes, keys);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        self.update(|values| {
            for key in keys {
                values.remove(*key);
            }
        })
        .await?;
        tracing::debug!(?keys, "store remove");
        notify(&self.changes, keys.iter().map(|k| k.to_string()).collect());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

fn notify(changes: &broadcast::Sender<StoreChange>, keys: Vec<String>) {
    // No subscribers is fine
    let _ = changes.send(StoreChange { keys });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());

        store.set_as("geminiApiKey", "abc").await.unwrap();
        let key: Option<String> = store.get_as("geminiApiKey").await.unwrap();
        assert_eq!(key.as_deref(), Some("abc"));

        store.remove(&["geminiApiKey", "never-set"]).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        store
            .set_many(vec![
                ("selectedText".into(), json!("hi")),
                ("pendingQuestion".into(), json!(true)),
            ])
            .await
            .unwrap();
        let change = rx.recv().await.unwrap();
        assert!(change.touches("selectedText"));
        assert!(change.touches("pendingQuestion"));

        store.remove(&["selectedText"]).await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.keys, vec!["selectedText".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_value_reports_key() {
        let store = MemoryStore::new();
        store.set_as("conversationHistory", &json!("not a list")).await.unwrap();
        let result: StoreResult<Option<Vec<String>>> = store.get_as("conversationHistory").await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("conversationHistory"));
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.json");

        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store.set_as("geminiApiKey", "secret").await.unwrap();
            store
                .set_as("conversationHistory", &json!([{"role": "user", "content": "hi"}]))
                .await
                .unwrap();
            store.remove(&["geminiApiKey"]).await.unwrap();
        }

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert!(reopened.get("geminiApiKey").await.unwrap().is_none());
        let history = reopened.get("conversationHistory").await.unwrap().unwrap();
        assert_eq!(history[0]["content"], "hi");
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path).await,
            Err(StoreError::Serde(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_instances_share_one_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let panel = JsonFileStore::open(&path).await.unwrap();
        let other = JsonFileStore::open(&path).await.unwrap();

        other
            .set_many(vec![
                ("selectedText".into(), json!("from elsewhere")),
                ("pendingQuestion".into(), json!(true)),
            ])
            .await
            .unwrap();
        assert_eq!(
            panel.get("selectedText").await.unwrap(),
            Some(json!("from elsewhere"))
        );

        // A write from one instance keeps keys written by the other
        panel
            .set_as("conversationHistory", &json!([]))
            .await
            .unwrap();
        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("pendingQuestion").await.unwrap(),
            Some(json!(true))
        );
        assert!(reopened.get("conversationHistory").await.unwrap().is_some());

        panel.remove(&["selectedText"]).await.unwrap();
        assert!(other.get("selectedText").await.unwrap().is_none());
        assert_eq!(other.get("pendingQuestion").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        store.set_as("geminiApiKey", "kept").await.unwrap();

        // A directory in the temp file's place makes the write fail
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
        assert!(store.set_as("geminiApiKey", "lost").await.is_err());

        assert_eq!(store.get("geminiApiKey").await.unwrap(), Some(json!("kept")));
    }
}
