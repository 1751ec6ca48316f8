// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod fetch;
mod filename;
mod manager;
mod manifest;

pub use fetch::{ChunkProgress, fetch_to_file};
pub use filename::{FALLBACK_EXTENSION, audio_extension, episode_filename, filename_stem};
pub use manager::{DEFAULT_MAX_RETRIES, DownloadManager, DownloadOptions};
pub use manifest::DownloadManifest;
