// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::Utc;
use tracing::{debug, info};

use crate::error::PlaylistError;
use crate::model::{Episode, Playlist};
use crate::store::{PLAYLISTS_KEY, PersistedList, SharedStore};

/// The user's playlists, mirrored to the store on every change
pub struct PlaylistLibrary {
    playlists: PersistedList<Playlist>,
}

impl PlaylistLibrary {
    pub async fn load(store: SharedStore) -> Self {
        Self {
            playlists: PersistedList::load(store, PLAYLISTS_KEY).await,
        }
    }

    pub fn playlists(&self) -> Vec<Playlist> {
        self.playlists.snapshot()
    }

    pub fn get(&self, playlist_id: &str) -> Option<Playlist> {
        self.playlists
            .read(|playlists| playlists.iter().find(|p| p.id == playlist_id).cloned())
    }

    /// Create an empty playlist
    ///
    /// Ids are the creation time in milliseconds, bumped past any id already
    /// taken.
    pub async fn create(&self, name: &str) -> Result<Playlist, PlaylistError> {
        let name = validate_name(name)?;

        let playlist = self
            .playlists
            .update(|playlists| {
                let mut id = Utc::now().timestamp_millis();
                while playlists.iter().any(|p| p.id == id.to_string()) {
                    id += 1;
                }

                let playlist = Playlist {
                    id: id.to_string(),
                    name,
                    episodes: Vec::new(),
                    created_at: Utc::now(),
                };
                playlists.push(playlist.clone());
                playlist
            })
            .await?;

        info!(playlist_id = %playlist.id, name = %playlist.name, "playlist created");
        Ok(playlist)
    }

    pub async fn rename(&self, playlist_id: &str, new_name: &str) -> Result<(), PlaylistError> {
        let new_name = validate_name(new_name)?;

        let found = self
            .playlists
            .update(|playlists| {
                playlists
                    .iter_mut()
                    .find(|p| p.id == playlist_id)
                    .map(|p| p.name = new_name)
                    .is_some()
            })
            .await?;

        if !found {
            return Err(PlaylistError::NotFound(playlist_id.to_string()));
        }
        Ok(())
    }

    /// Delete a playlist; unknown ids are ignored
    pub async fn delete(&self, playlist_id: &str) -> Result<(), PlaylistError> {
        if self.get(playlist_id).is_none() {
            debug!(playlist_id, "delete requested for unknown playlist");
            return Ok(());
        }

        self.playlists
            .update(|playlists| playlists.retain(|p| p.id != playlist_id))
            .await?;
        info!(playlist_id, "playlist deleted");
        Ok(())
    }

    /// Append an episode unless the playlist already holds one with its id
    ///
    /// Returns whether the episode was added.
    pub async fn add_episode(
        &self,
        playlist_id: &str,
        episode: &Episode,
    ) -> Result<bool, PlaylistError> {
        let playlist = self
            .get(playlist_id)
            .ok_or_else(|| PlaylistError::NotFound(playlist_id.to_string()))?;
        if playlist.contains(&episode.id) {
            return Ok(false);
        }

        let added = self
            .playlists
            .update(|playlists| {
                let Some(playlist) = playlists.iter_mut().find(|p| p.id == playlist_id) else {
                    return Err(PlaylistError::NotFound(playlist_id.to_string()));
                };
                if playlist.contains(&episode.id) {
                    return Ok(false);
                }
                playlist.episodes.push(episode.clone());
                Ok(true)
            })
            .await??;

        Ok(added)
    }

    /// Remove an episode from a playlist
    ///
    /// Returns whether the playlist held the episode.
    pub async fn remove_episode(
        &self,
        playlist_id: &str,
        episode_id: &str,
    ) -> Result<bool, PlaylistError> {
        let playlist = self
            .get(playlist_id)
            .ok_or_else(|| PlaylistError::NotFound(playlist_id.to_string()))?;
        if !playlist.contains(episode_id) {
            return Ok(false);
        }

        self.playlists
            .update(|playlists| {
                if let Some(playlist) = playlists.iter_mut().find(|p| p.id == playlist_id) {
                    playlist.episodes.retain(|ep| ep.id != episode_id);
                }
            })
            .await?;

        Ok(true)
    }
}

fn validate_name(name: &str) -> Result<String, PlaylistError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PlaylistError::EmptyName);
    }
    Ok(trimmed.to_string())
}
