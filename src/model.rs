// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A playable piece of podcast audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    /// Stable per feed item (RSS guid, or the enclosure URL without one)
    pub id: String,
    pub title: String,
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
}

impl Episode {
    pub fn new(id: impl Into<String>, title: impl Into<String>, audio_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            audio_url: audio_url.into(),
            image_url: None,
            feed_url: None,
        }
    }
}

/// A completed local copy of an episode, as stored in the downloads manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    #[serde(flatten)]
    pub episode: Episode,
    pub download_path: PathBuf,
    pub download_date: DateTime<Utc>,
}

impl DownloadRecord {
    pub fn new(episode: Episode, download_path: PathBuf) -> Self {
        Self {
            episode,
            download_path,
            download_date: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.episode.id
    }
}

/// A user-named, ordered collection of episodes without duplicate ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    pub created_at: DateTime<Utc>,
}

impl Playlist {
    pub fn contains(&self, episode_id: &str) -> bool {
        self.episodes.iter().any(|ep| ep.id == episode_id)
    }
}
