// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod download;
pub mod error;
pub mod feed;
pub mod http;
pub mod model;
pub mod playback;
pub mod playlist;
pub mod progress;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use download::{DEFAULT_MAX_RETRIES, DownloadManager, DownloadOptions, episode_filename};
pub use error::{
    DownloadError, EngineError, FeedError, PlaybackError, PlaylistError, StoreError,
};
pub use feed::{
    FeedEpisode, FeedLibrary, FeedSubscription, Podcast, fetch_feed, is_url, load_feed,
    parse_feed, parse_feed_file, plain_text,
};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use model::{DownloadRecord, Episode, Playlist};
pub use playback::{
    AudioEngine, DEFAULT_SKIP_MILLIS, EngineStatus, LoadedSound, NowPlaying, PlayRequest,
    PlaybackCoordinator, PlayerSnapshot, Sound,
};
pub use playlist::PlaylistLibrary;
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, SharedStore};
