// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! String-keyed persistence of JSON blobs.
//!
//! The stored JSON shape is the only contract: there is no schema version,
//! and a blob that is missing or fails to parse is read as empty.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::StoreError;

// Keys match the ones the mobile app writes, so its data stays readable

/// Key of the downloads manifest blob
pub const DOWNLOADS_KEY: &str = "@podcast_downloads";
/// Key of the playlists blob
pub const PLAYLISTS_KEY: &str = "@podcast_playlists";
/// Key of the feed subscriptions blob
pub const FEEDS_KEY: &str = "rssFeeds";

/// Asynchronous key-value store holding serialized JSON
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A shared reference to a key-value store
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Load a list stored under `key`, treating missing or unparsable data as empty
pub async fn load_list<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Vec<T> {
    let raw = match store.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(key, error = %e, "failed to read stored list, starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(key, error = %e, "stored list is not valid JSON, starting empty");
            Vec::new()
        }
    }
}

/// Serialize `items` and store them under `key`
pub async fn save_list<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    items: &[T],
) -> Result<(), StoreError> {
    let json = serde_json::to_string(items).map_err(|e| StoreError::SerializeFailed {
        key: key.to_string(),
        source: e,
    })?;
    store.set(key, json).await
}

/// An ordered list mirrored in memory and persisted under a single key
///
/// Reads never touch the store. Writes are serialized so blobs land in the
/// same order as the mutations that produced them.
pub struct PersistedList<T> {
    store: SharedStore,
    key: &'static str,
    items: RwLock<Vec<T>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl<T> PersistedList<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Load the list stored under `key`, starting empty if there is none
    pub async fn load(store: SharedStore, key: &'static str) -> Self {
        let items = load_list(store.as_ref(), key).await;
        Self {
            store,
            key,
            items: RwLock::new(items),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.items.read())
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Apply `f` to a copy of the list, persist it, and only then make it
    /// visible. On a store failure the in-memory list is left untouched.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.items.read().clone();
        let result = f(&mut next);
        save_list(self.store.as_ref(), self.key, &next).await?;
        *self.items.write() = next;

        Ok(result)
    }

    /// Apply `f` in memory right away, then persist. The change stays
    /// visible even if persisting fails.
    pub async fn commit_then_persist<R>(
        &self,
        f: impl FnOnce(&mut Vec<T>) -> R,
    ) -> (R, Result<(), StoreError>) {
        let _guard = self.write_lock.lock().await;

        let (result, next) = {
            let mut items = self.items.write();
            let result = f(&mut items);
            (result, items.clone())
        };
        let persisted = save_list(self.store.as_ref(), self.key, &next).await;

        (result, persisted)
    }
}

/// Store keeping one `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_filename::sanitize(key)))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ReadFailed { path, source: e }),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let path = self.path_for(key);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::WriteFailed {
                path: self.dir.clone(),
                source: e,
            })?;

        // Write next to the target and rename so readers never see a torn file
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, value)
            .await
            .map_err(|e| StoreError::WriteFailed {
                path: tmp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StoreError::WriteFailed { path, source: e })
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::RemoveFailed { path, source: e }),
        }
    }
}

/// In-memory store, useful for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_store_round_trips_values() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store"));

        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("greeting", "\"hello\"".to_string()).await.unwrap();
        assert_eq!(
            store.get("greeting").await.unwrap().as_deref(),
            Some("\"hello\"")
        );
        assert!(dir.path().join("store/greeting.json").exists());
        assert!(!dir.path().join("store/greeting.json.tmp").exists());

        store.remove("greeting").await.unwrap();
        assert_eq!(store.get("greeting").await.unwrap(), None);
        // Removing again is fine
        store.remove("greeting").await.unwrap();
    }

    #[tokio::test]
    async fn app_keys_map_to_readable_file_names() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        save_list::<String>(&store, DOWNLOADS_KEY, &[]).await.unwrap();
        save_list::<String>(&store, FEEDS_KEY, &[]).await.unwrap();

        assert!(dir.path().join("@podcast_downloads.json").exists());
        assert!(dir.path().join("rssFeeds.json").exists());
        assert!(load_list::<String>(&store, PLAYLISTS_KEY).await.is_empty());
    }

    #[tokio::test]
    async fn load_list_treats_garbage_as_empty() {
        let store = MemoryStore::new();
        store.set("numbers", "{not json".to_string()).await.unwrap();

        let items: Vec<u32> = load_list(&store, "numbers").await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn load_list_treats_missing_as_empty() {
        let store = MemoryStore::new();
        let items: Vec<String> = load_list(&store, "nothing").await;
        assert!(items.is_empty());
    }

    /// Store whose writes can be switched off
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: Mutex<bool>,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
            if *self.fail_writes.lock() {
                return Err(StoreError::WriteFailed {
                    path: PathBuf::from(key),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn persisted_list_update_is_written_through() {
        let store = MemoryStore::shared();
        let list: PersistedList<u32> = PersistedList::load(store.clone(), "numbers").await;

        let len = list.update(|items| {
            items.push(7);
            items.len()
        })
        .await
        .unwrap();

        assert_eq!(len, 1);
        assert_eq!(list.snapshot(), vec![7]);

        let reloaded: PersistedList<u32> = PersistedList::load(store, "numbers").await;
        assert_eq!(reloaded.snapshot(), vec![7]);
    }

    #[tokio::test]
    async fn persisted_list_update_keeps_memory_on_store_failure() {
        let store = Arc::new(FlakyStore::default());
        let list: PersistedList<u32> = PersistedList::load(store.clone(), "numbers").await;
        list.update(|items| items.push(1)).await.unwrap();

        *store.fail_writes.lock() = true;
        assert!(list.update(|items| items.push(2)).await.is_err());
        assert_eq!(list.snapshot(), vec![1]);
    }

    #[tokio::test]
    async fn commit_then_persist_keeps_change_on_store_failure() {
        let store = Arc::new(FlakyStore::default());
        let list: PersistedList<u32> = PersistedList::load(store.clone(), "numbers").await;
        list.update(|items| items.extend([1, 2])).await.unwrap();

        *store.fail_writes.lock() = true;
        let (_, persisted) = list.commit_then_persist(|items| items.retain(|&n| n != 1)).await;

        assert!(persisted.is_err());
        assert_eq!(list.snapshot(), vec![2]);
    }

    #[tokio::test]
    async fn save_then_load_list() {
        let store = MemoryStore::new();
        save_list(&store, "numbers", &[3u32, 1, 2]).await.unwrap();

        let items: Vec<u32> = load_list(&store, "numbers").await;
        assert_eq!(items, vec![3, 1, 2]);
    }
}
