// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test doubles shared by the unit tests of several modules.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use parking_lot::Mutex;

use crate::error::EngineError;
use crate::http::{ByteStream, HttpClient, HttpResponse};
use crate::playback::{AudioEngine, EngineStatus, LoadedSound, Sound};

/// Serves a fixed body, honouring range requests when `supports_range` is set
pub(crate) struct MockHttpClient {
    pub(crate) response_data: Vec<u8>,
    pub(crate) status: u16,
    pub(crate) supports_range: bool,
    pub(crate) chunk_size: usize,
    pub(crate) requests: Mutex<Vec<Option<u64>>>,
}

impl MockHttpClient {
    pub(crate) fn new(data: &[u8]) -> Self {
        Self {
            response_data: data.to_vec(),
            status: 200,
            supports_range: false,
            chunk_size: 4,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
        Ok(Bytes::from(self.response_data.clone()))
    }

    async fn get_stream(
        &self,
        _url: &str,
        range_start: Option<u64>,
    ) -> Result<HttpResponse, reqwest::Error> {
        self.requests.lock().push(range_start);

        let (status, data) = match range_start {
            Some(offset) if self.supports_range && self.status == 200 => {
                (206, self.response_data[offset as usize..].to_vec())
            }
            _ => (self.status, self.response_data.clone()),
        };
        let len = data.len() as u64;

        let chunks: Vec<Result<Bytes, reqwest::Error>> = data
            .chunks(self.chunk_size.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let stream: ByteStream = Box::pin(futures::stream::iter(chunks));

        Ok(HttpResponse {
            status,
            content_length: Some(len),
            body: stream,
        })
    }
}

/// Observable state of one sound handed out by [`MockEngine`]
pub(crate) struct MockSoundState {
    pub(crate) uri: String,
    pub(crate) playing: AtomicBool,
    pub(crate) position: AtomicU64,
    pub(crate) stopped: AtomicBool,
    pub(crate) unloaded: AtomicBool,
    pub(crate) fail_transport: AtomicBool,
    pub(crate) fail_play: AtomicBool,
    duration_millis: Option<u64>,
    updates: mpsc::UnboundedSender<EngineStatus>,
}

impl MockSoundState {
    /// Push the sound's current state, as engines do after every change
    fn publish(&self) {
        self.emit(EngineStatus {
            position_millis: self.position.load(Ordering::SeqCst),
            duration_millis: self.duration_millis,
            is_playing: self.playing.load(Ordering::SeqCst),
            did_just_finish: false,
        });
    }

    /// Push a status update as the engine would
    pub(crate) fn emit(&self, status: EngineStatus) {
        let _ = self.updates.unbounded_send(status);
    }

    pub(crate) fn is_released(&self) -> bool {
        self.unloaded.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.is_released() || self.fail_transport.load(Ordering::SeqCst) {
            return Err(EngineError::NotLoaded);
        }
        Ok(())
    }
}

struct MockSound(Arc<MockSoundState>);

#[async_trait]
impl Sound for MockSound {
    async fn play(&self) -> Result<(), EngineError> {
        self.0.check()?;
        if self.0.fail_play.load(Ordering::SeqCst) {
            return Err(EngineError::Other("output device busy".to_string()));
        }
        self.0.playing.store(true, Ordering::SeqCst);
        self.0.publish();
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.0.check()?;
        self.0.playing.store(false, Ordering::SeqCst);
        self.0.publish();
        Ok(())
    }

    async fn set_position(&self, position_millis: u64) -> Result<(), EngineError> {
        self.0.check()?;
        self.0.position.store(position_millis, Ordering::SeqCst);
        self.0.publish();
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        self.0.playing.store(false, Ordering::SeqCst);
        self.0.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self) -> Result<(), EngineError> {
        self.0.unloaded.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine that records every sound it loads
#[derive(Default)]
pub(crate) struct MockEngine {
    pub(crate) sounds: Mutex<Vec<Arc<MockSoundState>>>,
    pub(crate) failing_uris: Mutex<HashSet<String>>,
    pub(crate) fail_play: AtomicBool,
    /// Duration reported in the status updates of every sound
    pub(crate) duration_millis: Option<u64>,
    /// Suspend once inside `load`, as a real engine opening a source would
    pub(crate) yield_on_load: AtomicBool,
}

impl MockEngine {
    pub(crate) fn with_duration(duration_millis: u64) -> Self {
        Self {
            duration_millis: Some(duration_millis),
            ..Self::default()
        }
    }

    pub(crate) fn last_sound(&self) -> Option<Arc<MockSoundState>> {
        self.sounds.lock().last().cloned()
    }

    /// Sounds that have been loaded and not yet released
    pub(crate) fn live_sounds(&self) -> usize {
        self.sounds
            .lock()
            .iter()
            .filter(|s| !s.is_released())
            .count()
    }
}

#[async_trait]
impl AudioEngine for MockEngine {
    async fn load(&self, uri: &str) -> Result<LoadedSound, EngineError> {
        if self.yield_on_load.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.failing_uris.lock().contains(uri) {
            return Err(EngineError::LoadFailed {
                uri: uri.to_string(),
                reason: "unsupported format".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded();
        let state = Arc::new(MockSoundState {
            uri: uri.to_string(),
            playing: AtomicBool::new(false),
            position: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            unloaded: AtomicBool::new(false),
            fail_transport: AtomicBool::new(false),
            fail_play: AtomicBool::new(self.fail_play.load(Ordering::SeqCst)),
            duration_millis: self.duration_millis,
            updates: tx,
        });

        self.sounds.lock().push(state.clone());

        Ok(LoadedSound {
            sound: Box::new(MockSound(state)),
            updates: Box::pin(rx),
        })
    }
}
