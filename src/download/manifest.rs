// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use crate::error::StoreError;
use crate::model::DownloadRecord;
use crate::store::{DOWNLOADS_KEY, PersistedList, SharedStore};

/// The persisted list of completed downloads
///
/// Holds at most one record per episode id, in the order the downloads
/// completed.
pub struct DownloadManifest {
    records: PersistedList<DownloadRecord>,
}

impl DownloadManifest {
    pub async fn load(store: SharedStore) -> Self {
        Self {
            records: PersistedList::load(store, DOWNLOADS_KEY).await,
        }
    }

    pub fn records(&self) -> Vec<DownloadRecord> {
        self.records.snapshot()
    }

    pub fn get(&self, episode_id: &str) -> Option<DownloadRecord> {
        self.records
            .read(|records| records.iter().find(|r| r.id() == episode_id).cloned())
    }

    pub fn contains(&self, episode_id: &str) -> bool {
        self.records
            .read(|records| records.iter().any(|r| r.id() == episode_id))
    }

    pub fn local_path(&self, episode_id: &str) -> Option<PathBuf> {
        self.records.read(|records| {
            records
                .iter()
                .find(|r| r.id() == episode_id)
                .map(|r| r.download_path.clone())
        })
    }

    pub fn ids(&self) -> Vec<String> {
        self.records
            .read(|records| records.iter().map(|r| r.id().to_string()).collect())
    }

    /// Add a record, replacing any existing record for the same episode
    pub async fn upsert(&self, record: DownloadRecord) -> Result<(), StoreError> {
        self.records
            .update(|records| {
                match records.iter_mut().find(|r| r.id() == record.id()) {
                    Some(existing) => *existing = record,
                    None => records.push(record),
                }
            })
            .await
    }

    /// Remove the record for `episode_id`
    ///
    /// The record disappears from memory even when persisting fails, so the
    /// manifest never keeps pointing at a file whose deletion was requested.
    pub async fn remove(
        &self,
        episode_id: &str,
    ) -> (Option<DownloadRecord>, Result<(), StoreError>) {
        self.records
            .commit_then_persist(|records| {
                let index = records.iter().position(|r| r.id() == episode_id)?;
                Some(records.remove(index))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Episode;
    use crate::store::{KeyValueStore, MemoryStore};

    fn record(id: &str, path: &str) -> DownloadRecord {
        DownloadRecord::new(
            Episode::new(id, format!("Episode {id}"), format!("https://example.com/{id}.mp3")),
            PathBuf::from(path),
        )
    }

    #[tokio::test]
    async fn upsert_keeps_one_record_per_episode() {
        let manifest = DownloadManifest::load(MemoryStore::shared()).await;

        manifest.upsert(record("a", "/old/a.mp3")).await.unwrap();
        manifest.upsert(record("b", "/b.mp3")).await.unwrap();
        manifest.upsert(record("a", "/new/a.mp3")).await.unwrap();

        assert_eq!(manifest.ids(), vec!["a", "b"]);
        assert_eq!(manifest.local_path("a"), Some(PathBuf::from("/new/a.mp3")));
    }

    #[tokio::test]
    async fn manifest_survives_reload() {
        let store = MemoryStore::shared();
        let manifest = DownloadManifest::load(store.clone()).await;
        manifest.upsert(record("a", "/a.mp3")).await.unwrap();

        let reloaded = DownloadManifest::load(store).await;
        assert!(reloaded.contains("a"));
        assert_eq!(reloaded.get("a").unwrap().episode.title, "Episode a");
    }

    #[tokio::test]
    async fn remove_returns_the_record() {
        let manifest = DownloadManifest::load(MemoryStore::shared()).await;
        manifest.upsert(record("a", "/a.mp3")).await.unwrap();

        let (removed, persisted) = manifest.remove("a").await;
        persisted.unwrap();
        assert_eq!(removed.unwrap().id(), "a");
        assert!(!manifest.contains("a"));

        let (missing, _) = manifest.remove("a").await;
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn corrupt_manifest_loads_empty() {
        let store = MemoryStore::shared();
        store
            .set(DOWNLOADS_KEY, "[{\"id\": 1".to_string())
            .await
            .unwrap();

        let manifest = DownloadManifest::load(store).await;
        assert!(manifest.records().is_empty());
    }
}
