// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::EngineError;

/// A status update pushed by the audio engine for a loaded sound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub position_millis: u64,
    /// Unknown until the engine has probed the media
    pub duration_millis: Option<u64>,
    pub is_playing: bool,
    /// Set once when playback reaches the end of the media
    pub did_just_finish: bool,
}

/// Status updates of one loaded sound, at the engine's own cadence
pub type StatusStream = Pin<Box<dyn Stream<Item = EngineStatus> + Send>>;

/// Transport controls of a loaded sound
#[async_trait]
pub trait Sound: Send + Sync {
    async fn play(&self) -> Result<(), EngineError>;
    async fn pause(&self) -> Result<(), EngineError>;
    async fn set_position(&self, position_millis: u64) -> Result<(), EngineError>;
    async fn stop(&self) -> Result<(), EngineError>;
    /// Release the decoder and output resources held by the sound
    async fn unload(&self) -> Result<(), EngineError>;
}

/// A freshly loaded sound and its status stream
pub struct LoadedSound {
    pub sound: Box<dyn Sound>,
    pub updates: StatusStream,
}

/// Audio decode/output capability
///
/// Implementations wrap whatever platform player is available; the
/// coordinator only relies on this trait.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Open a remote URL or local path, paused at position zero
    async fn load(&self, uri: &str) -> Result<LoadedSound, EngineError>;
}
