// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Episode '{title}' has no enclosure")]
    MissingEnclosure { title: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that can occur during episode downloads
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid audio URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to create {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Downloaded file {path} is missing or empty")]
    Integrity { path: PathBuf },

    #[error("Episode {episode_id} is already being downloaded")]
    InProgress { episode_id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Download of episode {episode_id} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        episode_id: String,
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },
}

/// Errors raised by the persistent key-value store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read store entry {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write store entry {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove store entry {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize value for key {key}: {source}")]
    SerializeFailed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from playlist operations
#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("Playlist not found: {0}")]
    NotFound(String),

    #[error("Playlist name must not be empty")]
    EmptyName,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors reported by an audio engine implementation
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to load {uri}: {reason}")]
    LoadFailed { uri: String, reason: String },

    #[error("Sound is not loaded")]
    NotLoaded,

    #[error("Audio engine error: {0}")]
    Other(String),
}

/// Errors surfaced by the playback coordinator
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Could not open audio source {uri}: {source}")]
    Open {
        uri: String,
        #[source]
        source: EngineError,
    },
}
