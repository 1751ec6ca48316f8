// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::download::fetch::{ChunkProgress, fetch_to_file};
use crate::download::filename::episode_filename;
use crate::download::manifest::DownloadManifest;
use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::model::{DownloadRecord, Episode};
use crate::progress::{NoopReporter, ProgressEvent, SharedProgressReporter};
use crate::store::SharedStore;

/// Retries after the first failed attempt, unless configured otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Suffix of the file a download is streamed into before it is complete
const PARTIAL_SUFFIX: &str = "partial";

/// Options for the download manager
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Directory the episode files are written to
    pub download_dir: PathBuf,
    /// Number of retries after a failed attempt (no backoff between them)
    pub max_retries: u32,
}

impl DownloadOptions {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Turns remote episodes into durable local files
///
/// Owns the downloads manifest and the transient progress map. One instance
/// per process; construct a fresh one per test.
pub struct DownloadManager<C> {
    client: C,
    manifest: DownloadManifest,
    options: DownloadOptions,
    progress: Mutex<HashMap<String, f64>>,
    in_flight: Mutex<HashSet<String>>,
    reporter: SharedProgressReporter,
}

/// Marks an episode as in flight until dropped
///
/// Dropping also clears the progress entry, so no stale value survives an
/// attempt that ended early.
struct InFlight<'a> {
    episode_id: &'a str,
    progress: &'a Mutex<HashMap<String, f64>>,
    in_flight: &'a Mutex<HashSet<String>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.progress.lock().remove(self.episode_id);
        self.in_flight.lock().remove(self.episode_id);
    }
}

impl<C: HttpClient> DownloadManager<C> {
    /// Create a manager, loading the manifest from `store`
    pub async fn open(client: C, store: SharedStore, options: DownloadOptions) -> Self {
        let manifest = DownloadManifest::load(store).await;
        debug!(
            downloads = manifest.records().len(),
            dir = %options.download_dir.display(),
            "download manifest loaded"
        );

        Self {
            client,
            manifest,
            options,
            progress: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            reporter: NoopReporter::shared(),
        }
    }

    /// Report download progress events to `reporter`
    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// The local path an episode is (or would be) stored at
    pub fn target_path(&self, episode: &Episode) -> PathBuf {
        self.options.download_dir.join(episode_filename(episode))
    }

    /// Download an episode with the configured number of retries
    pub async fn download(&self, episode: &Episode) -> Result<PathBuf, DownloadError> {
        self.download_with_retries(episode, self.options.max_retries)
            .await
    }

    /// Download an episode, retrying a failed attempt up to `max_retries` times
    ///
    /// Returns the local path. A file that is already present and non-empty
    /// is returned without fetching. Retries happen immediately with no
    /// backoff; every failed attempt removes whatever it left on disk.
    pub async fn download_with_retries(
        &self,
        episode: &Episode,
        max_retries: u32,
    ) -> Result<PathBuf, DownloadError> {
        Url::parse(&episode.audio_url).map_err(|e| DownloadError::InvalidUrl {
            url: episode.audio_url.clone(),
            source: e,
        })?;

        let _in_flight = self.begin(&episode.id)?;
        let target = self.target_path(episode);

        // A complete file we did not write is never retried or cleaned up
        if has_content(&target).await {
            return self.adopt_existing(episode, &target).await;
        }

        let attempts = max_retries.saturating_add(1);

        let mut attempt = 1;
        loop {
            let error = match self.attempt(episode, &target, attempt).await {
                Ok(path) => return Ok(path),
                Err(e) => e,
            };

            self.progress.lock().remove(&episode.id);
            self.cleanup(&target).await;

            if attempt >= attempts {
                warn!(
                    episode_id = %episode.id,
                    attempts,
                    error = %error,
                    "download failed, no retries left"
                );
                self.reporter.report(ProgressEvent::DownloadFailed {
                    episode_id: episode.id.clone(),
                    episode_title: episode.title.clone(),
                    error: error.to_string(),
                });
                return Err(DownloadError::RetriesExhausted {
                    episode_id: episode.id.clone(),
                    attempts,
                    source: Box::new(error),
                });
            }

            let retries_left = attempts - attempt;
            warn!(
                episode_id = %episode.id,
                retries_left,
                error = %error,
                "download attempt failed, retrying"
            );
            self.reporter.report(ProgressEvent::DownloadRetrying {
                episode_id: episode.id.clone(),
                episode_title: episode.title.clone(),
                error: error.to_string(),
                retries_left,
            });
            attempt += 1;
        }
    }

    /// Delete a downloaded episode's file and its manifest entry
    ///
    /// Unknown ids are ignored. A file that cannot be deleted is logged and
    /// the manifest entry is removed regardless.
    pub async fn delete_download(&self, episode_id: &str) -> Result<(), DownloadError> {
        let Some(record) = self.manifest.get(episode_id) else {
            debug!(episode_id, "delete requested for unknown download");
            return Ok(());
        };

        match tokio::fs::remove_file(&record.download_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %record.download_path.display(), "downloaded file already gone");
            }
            Err(e) => {
                warn!(
                    path = %record.download_path.display(),
                    error = %e,
                    "failed to delete downloaded file"
                );
            }
        }

        let (_, persisted) = self.manifest.remove(episode_id).await;
        persisted?;

        info!(episode_id, "download deleted");
        Ok(())
    }

    pub fn is_downloaded(&self, episode_id: &str) -> bool {
        self.manifest.contains(episode_id)
    }

    pub fn local_path(&self, episode_id: &str) -> Option<PathBuf> {
        self.manifest.local_path(episode_id)
    }

    /// Progress of an in-flight download, 0.0 when there is none
    pub fn progress(&self, episode_id: &str) -> f64 {
        self.progress
            .lock()
            .get(episode_id)
            .copied()
            .unwrap_or(0.0)
    }

    /// Progress of every in-flight download, keyed by episode id
    pub fn progress_snapshot(&self) -> HashMap<String, f64> {
        self.progress.lock().clone()
    }

    /// Completed downloads in the order they finished
    pub fn downloads(&self) -> Vec<DownloadRecord> {
        self.manifest.records()
    }

    pub fn downloaded_ids(&self) -> Vec<String> {
        self.manifest.ids()
    }

    fn begin<'a>(&'a self, episode_id: &'a str) -> Result<InFlight<'a>, DownloadError> {
        if !self.in_flight.lock().insert(episode_id.to_string()) {
            return Err(DownloadError::InProgress {
                episode_id: episode_id.to_string(),
            });
        }
        self.progress.lock().insert(episode_id.to_string(), 0.0);

        Ok(InFlight {
            episode_id,
            progress: &self.progress,
            in_flight: &self.in_flight,
        })
    }

    async fn attempt(
        &self,
        episode: &Episode,
        target: &Path,
        attempt: u32,
    ) -> Result<PathBuf, DownloadError> {
        let dir = &self.options.download_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: dir.clone(),
                source: e,
            })?;

        match tokio::fs::metadata(target).await {
            Ok(meta) if meta.is_file() && meta.len() == 0 => {
                debug!(path = %target.display(), "removing empty file left by an earlier download");
                tokio::fs::remove_file(target)
                    .await
                    .map_err(|e| DownloadError::FileWriteFailed {
                        path: target.to_path_buf(),
                        source: e,
                    })?;
            }
            _ => {}
        }

        let partial = partial_path(target);
        debug!(episode_id = %episode.id, url = %episode.audio_url, attempt, "starting download");

        let mut started = false;
        let bytes = fetch_to_file(&self.client, &episode.audio_url, &partial, |chunk| {
            if !started {
                started = true;
                self.reporter.report(ProgressEvent::DownloadStarting {
                    episode_id: episode.id.clone(),
                    episode_title: episode.title.clone(),
                    attempt,
                    content_length: chunk.total,
                    resumed_from: chunk.resumed_from,
                });
            }
            self.record_progress(&episode.id, chunk);
        })
        .await?;

        tokio::fs::rename(&partial, target)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: target.to_path_buf(),
                source: e,
            })?;

        let size = tokio::fs::metadata(target)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(DownloadError::Integrity {
                path: target.to_path_buf(),
            });
        }

        self.manifest
            .upsert(DownloadRecord::new(episode.clone(), target.to_path_buf()))
            .await?;
        self.progress.lock().remove(&episode.id);

        info!(episode_id = %episode.id, bytes, path = %target.display(), "download completed");
        self.reporter.report(ProgressEvent::DownloadCompleted {
            episode_id: episode.id.clone(),
            episode_title: episode.title.clone(),
            path: target.to_path_buf(),
            bytes_downloaded: bytes,
        });

        Ok(target.to_path_buf())
    }

    /// Fast path for a valid file already at the target path
    async fn adopt_existing(
        &self,
        episode: &Episode,
        target: &Path,
    ) -> Result<PathBuf, DownloadError> {
        if !self.manifest.contains(&episode.id) {
            self.manifest
                .upsert(DownloadRecord::new(episode.clone(), target.to_path_buf()))
                .await?;
        }

        debug!(episode_id = %episode.id, path = %target.display(), "episode already downloaded");
        self.progress.lock().remove(&episode.id);
        self.reporter.report(ProgressEvent::AlreadyDownloaded {
            episode_id: episode.id.clone(),
            episode_title: episode.title.clone(),
            path: target.to_path_buf(),
        });

        Ok(target.to_path_buf())
    }

    fn record_progress(&self, episode_id: &str, chunk: ChunkProgress) {
        let Some(fraction) = chunk.fraction() else {
            return;
        };

        let published = {
            let mut progress = self.progress.lock();
            let entry = progress.entry(episode_id.to_string()).or_insert(0.0);
            // Never publish a smaller value for the same download
            if fraction > *entry {
                *entry = fraction;
            }
            *entry
        };

        self.reporter.report(ProgressEvent::DownloadProgress {
            episode_id: episode_id.to_string(),
            bytes_downloaded: chunk.written,
            total_bytes: chunk.total,
            fraction: published,
        });
    }

    /// Remove anything a failed attempt may have left behind
    async fn cleanup(&self, target: &Path) {
        for path in [partial_path(target), target.to_path_buf()] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "removed file of failed download"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to clean up after failed download"
                ),
            }
        }
    }
}

async fn has_content(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
