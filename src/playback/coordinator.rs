// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::StreamExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::download::DownloadManager;
use crate::error::{EngineError, PlaybackError};
use crate::http::HttpClient;
use crate::model::Episode;
use crate::playback::engine::{AudioEngine, EngineStatus, Sound, StatusStream};

/// Distance covered by a skip when the caller has no preference
pub const DEFAULT_SKIP_MILLIS: u64 = 30_000;

/// What the active session is playing and where it is
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub episode_id: String,
    pub source_uri: String,
    pub title: Option<String>,
    pub artwork_uri: Option<String>,
    pub feed_url: Option<String>,
    pub is_playing: bool,
    pub position_millis: u64,
    pub duration_millis: Option<u64>,
    session: u64,
}

impl NowPlaying {
    /// Position as a fraction of the duration, if the duration is known
    pub fn fraction(&self) -> Option<f64> {
        match self.duration_millis {
            Some(0) | None => None,
            Some(d) => Some((self.position_millis as f64 / d as f64).clamp(0.0, 1.0)),
        }
    }
}

/// The value published to observers
///
/// `now_playing` is `None` whenever no session is active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSnapshot {
    pub now_playing: Option<NowPlaying>,
}

impl PlayerSnapshot {
    pub fn is_playing(&self) -> bool {
        self.now_playing.as_ref().is_some_and(|n| n.is_playing)
    }

    pub fn episode_id(&self) -> Option<&str> {
        self.now_playing.as_ref().map(|n| n.episode_id.as_str())
    }
}

/// A request to start playback of one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRequest {
    pub source_uri: String,
    pub episode_id: String,
    pub title: Option<String>,
    pub artwork_uri: Option<String>,
    pub feed_url: Option<String>,
}

impl PlayRequest {
    pub fn new(source_uri: impl Into<String>, episode_id: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            episode_id: episode_id.into(),
            title: None,
            artwork_uri: None,
            feed_url: None,
        }
    }

    /// Play `episode` from `source_uri`, carrying its display metadata
    pub fn for_episode(episode: &Episode, source_uri: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            episode_id: episode.id.clone(),
            title: Some(episode.title.clone()),
            artwork_uri: episode.image_url.clone(),
            feed_url: episode.feed_url.clone(),
        }
    }
}

struct ActiveSession {
    id: u64,
    episode_id: String,
    sound: Arc<dyn Sound>,
    pump: JoinHandle<()>,
}

impl ActiveSession {
    /// Stop and unload the sound. Errors are logged; the sound is gone either way.
    async fn release(self, abort_pump: bool) {
        if abort_pump {
            self.pump.abort();
        }
        if let Err(e) = self.sound.stop().await {
            debug!(session = self.id, error = %e, "stop failed during teardown");
        }
        if let Err(e) = self.sound.unload().await {
            warn!(session = self.id, error = %e, "failed to unload sound");
        }
        debug!(session = self.id, episode_id = %self.episode_id, "session released");
    }
}

struct Inner<E> {
    engine: E,
    session: Mutex<Option<ActiveSession>>,
    status: watch::Sender<PlayerSnapshot>,
    persist: AtomicBool,
    next_session: AtomicU64,
}

impl<E> Inner<E> {
    /// Apply `f` to the published state if it still belongs to `session`
    fn update(&self, session: u64, f: impl FnOnce(&mut NowPlaying)) {
        self.status.send_if_modified(|snapshot| match snapshot.now_playing.as_mut() {
            Some(now) if now.session == session => {
                let before = now.clone();
                f(now);
                *now != before
            }
            _ => false,
        });
    }

    fn apply_status(&self, session: u64, status: EngineStatus) {
        self.update(session, |now| {
            now.position_millis = status.position_millis;
            now.is_playing = status.is_playing;
            if status.duration_millis.is_some() {
                now.duration_millis = status.duration_millis;
            }
        });
    }

    fn clear(&self) {
        self.status.send_if_modified(|snapshot| snapshot.now_playing.take().is_some());
    }

    /// Tear down `session` after the engine reported the end of the media
    async fn finish(&self, session: u64) {
        let mut guard = self.session.lock().await;
        if guard.as_ref().map(|s| s.id) != Some(session) {
            return;
        }
        if let Some(active) = guard.take() {
            info!(episode_id = %active.episode_id, "playback finished");
            // Called from the pump itself, which must not be aborted mid-teardown
            active.release(false).await;
        }
        self.persist.store(false, Ordering::SeqCst);
        self.clear();
    }
}

/// Owns the single playback session of the process
///
/// Starting a new source always stops and unloads the previous one first,
/// so at most one sound is ever loaded. Status is published through a
/// `watch` channel; every clone of the coordinator shares the session.
pub struct PlaybackCoordinator<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for PlaybackCoordinator<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: AudioEngine + 'static> PlaybackCoordinator<E> {
    pub fn new(engine: E) -> Self {
        let (status, _) = watch::channel(PlayerSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                engine,
                session: Mutex::new(None),
                status,
                persist: AtomicBool::new(false),
                next_session: AtomicU64::new(0),
            }),
        }
    }

    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// Play `source_uri` as episode `episode_id`
    pub async fn play(
        &self,
        source_uri: impl Into<String>,
        episode_id: impl Into<String>,
    ) -> Result<(), PlaybackError> {
        self.play_request(PlayRequest::new(source_uri, episode_id))
            .await
    }

    /// Play an episode, from its downloaded file when one exists
    pub async fn play_episode<C: HttpClient>(
        &self,
        episode: &Episode,
        downloads: &DownloadManager<C>,
    ) -> Result<(), PlaybackError> {
        let local = match downloads.local_path(&episode.id) {
            Some(path) => match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.len() > 0 => Some(path),
                _ => {
                    warn!(
                        episode_id = %episode.id,
                        path = %path.display(),
                        "downloaded file missing, streaming instead"
                    );
                    None
                }
            },
            None => None,
        };

        let source = match local {
            Some(path) => path.to_string_lossy().into_owned(),
            None => episode.audio_url.clone(),
        };
        self.play_request(PlayRequest::for_episode(episode, source))
            .await
    }

    /// Start playback of `request`
    ///
    /// If the same episode is already the active session it is only resumed.
    /// Otherwise the previous session is fully released before the new
    /// source is opened. On failure no session is left behind.
    pub async fn play_request(&self, request: PlayRequest) -> Result<(), PlaybackError> {
        let mut session = self.inner.session.lock().await;

        if let Some(active) = session.as_ref().filter(|s| s.episode_id == request.episode_id) {
            self.inner.persist.store(true, Ordering::SeqCst);
            if !self.snapshot().is_playing() {
                let id = active.id;
                match active.sound.play().await {
                    Ok(()) => self.inner.update(id, |now| now.is_playing = true),
                    Err(e) => warn!(episode_id = %request.episode_id, error = %e, "resume failed"),
                }
            }
            return Ok(());
        }

        if let Some(previous) = session.take() {
            previous.release(true).await;
        }
        self.inner.clear();

        let loaded = match self.inner.engine.load(&request.source_uri).await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.inner.persist.store(false, Ordering::SeqCst);
                warn!(uri = %request.source_uri, error = %e, "failed to open audio source");
                return Err(PlaybackError::Open {
                    uri: request.source_uri,
                    source: e,
                });
            }
        };

        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let sound: Arc<dyn Sound> = Arc::from(loaded.sound);

        self.inner.status.send_replace(PlayerSnapshot {
            now_playing: Some(NowPlaying {
                episode_id: request.episode_id.clone(),
                source_uri: request.source_uri.clone(),
                title: request.title,
                artwork_uri: request.artwork_uri,
                feed_url: request.feed_url,
                is_playing: false,
                position_millis: 0,
                duration_millis: None,
                session: id,
            }),
        });

        let pump = tokio::spawn(pump(Arc::downgrade(&self.inner), id, loaded.updates));
        let active = ActiveSession {
            id,
            episode_id: request.episode_id,
            sound: sound.clone(),
            pump,
        };

        if let Err(e) = sound.play().await {
            active.release(true).await;
            self.inner.clear();
            self.inner.persist.store(false, Ordering::SeqCst);
            warn!(uri = %request.source_uri, error = %e, "failed to start playback");
            return Err(PlaybackError::Open {
                uri: request.source_uri,
                source: e,
            });
        }

        self.inner.update(id, |now| now.is_playing = true);
        self.inner.persist.store(true, Ordering::SeqCst);
        info!(episode_id = %active.episode_id, uri = %request.source_uri, "playback started");
        *session = Some(active);
        Ok(())
    }

    /// Pause when playing, resume when paused
    pub async fn toggle_play_pause(&self) {
        let session = self.inner.session.lock().await;
        let Some(active) = session.as_ref() else {
            return;
        };

        let playing = self.snapshot().is_playing();
        let result = if playing {
            active.sound.pause().await
        } else {
            active.sound.play().await
        };

        match result {
            Ok(()) => self.inner.update(active.id, |now| now.is_playing = !playing),
            Err(e) => transport_failed("toggle", &e),
        }
    }

    /// Skip ahead, stopping at the end of the media once its duration is known
    pub async fn skip_forward(&self, delta_millis: u64) {
        self.seek_with(|now| {
            let target = now.position_millis.saturating_add(delta_millis);
            Some(now.duration_millis.map_or(target, |d| target.min(d)))
        })
        .await;
    }

    pub async fn skip_backward(&self, delta_millis: u64) {
        self.seek_with(|now| Some(now.position_millis.saturating_sub(delta_millis)))
            .await;
    }

    /// Seek to `fraction` of the duration; no-op while the duration is unknown
    pub async fn seek_to_fraction(&self, fraction: f64) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.seek_with(|now| {
            now.duration_millis
                .map(|d| (d as f64 * fraction).round() as u64)
        })
        .await;
    }

    /// Seek the active session to the position `target` derives from its state
    async fn seek_with(&self, target: impl FnOnce(&NowPlaying) -> Option<u64>) {
        let session = self.inner.session.lock().await;
        let Some(active) = session.as_ref() else {
            return;
        };

        let position_millis = {
            let snapshot = self.inner.status.borrow();
            match snapshot.now_playing.as_ref() {
                Some(now) if now.session == active.id => target(now),
                _ => None,
            }
        };
        let Some(position_millis) = position_millis else {
            return;
        };

        match active.sound.set_position(position_millis).await {
            Ok(()) => self
                .inner
                .update(active.id, |now| now.position_millis = position_millis),
            Err(e) => transport_failed("seek", &e),
        }
    }

    /// Stop and release the session
    ///
    /// Without `force` this does nothing while the session is persisting
    /// across navigation.
    pub async fn stop(&self, force: bool) {
        let mut session = self.inner.session.lock().await;
        // Read under the lock so a play that is still opening is seen
        if !force && self.is_persisting() {
            debug!("stop ignored, session persists");
            return;
        }

        if let Some(active) = session.take() {
            active.release(true).await;
            info!("playback stopped");
        }
        self.inner.persist.store(false, Ordering::SeqCst);
        self.inner.clear();
    }

    /// Keep the session alive through non-forced stops
    pub fn set_persist(&self, persist: bool) {
        self.inner.persist.store(persist, Ordering::SeqCst);
    }

    pub fn is_persisting(&self) -> bool {
        self.inner.persist.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.inner.status.borrow().clone()
    }

    /// Observe every published snapshot; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.inner.status.subscribe()
    }

    pub fn has_session(&self) -> bool {
        self.inner.status.borrow().now_playing.is_some()
    }
}

fn transport_failed(action: &str, error: &EngineError) {
    warn!(action, error = %error, "transport control failed, ignoring");
}

/// Forward the engine's status updates of one session to the observers
async fn pump<E>(inner: Weak<Inner<E>>, session: u64, mut updates: StatusStream) {
    while let Some(status) = updates.next().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.apply_status(session, status);
        if status.did_just_finish {
            inner.finish(session).await;
            return;
        }
    }
}
