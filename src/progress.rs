// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;

/// Events emitted while episodes are downloaded
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// An attempt to download an episode is starting
    DownloadStarting {
        episode_id: String,
        episode_title: String,
        /// 1-based attempt number
        attempt: u32,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
        /// Bytes already on disk from an interrupted download
        resumed_from: u64,
    },

    /// Download progress update
    DownloadProgress {
        episode_id: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        /// Fraction in [0, 1], never decreasing within one attempt
        fraction: f64,
    },

    /// An attempt failed and the download will be tried again
    DownloadRetrying {
        episode_id: String,
        episode_title: String,
        error: String,
        retries_left: u32,
    },

    /// A download completed successfully
    DownloadCompleted {
        episode_id: String,
        episode_title: String,
        path: PathBuf,
        bytes_downloaded: u64,
    },

    /// A valid local copy already existed, nothing was fetched
    AlreadyDownloaded {
        episode_id: String,
        episode_title: String,
        path: PathBuf,
    },

    /// A download failed after all retries
    DownloadFailed {
        episode_id: String,
        episode_title: String,
        error: String,
    },
}

/// Trait for reporting download progress events.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Reporter that records every event for later inspection
    #[derive(Default)]
    pub(crate) struct RecordingReporter {
        pub(crate) events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().push(event);
        }
    }

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter;

        reporter.report(ProgressEvent::DownloadStarting {
            episode_id: "ep1".to_string(),
            episode_title: "Episode 1".to_string(),
            attempt: 1,
            content_length: Some(1024),
            resumed_from: 0,
        });

        reporter.report(ProgressEvent::DownloadProgress {
            episode_id: "ep1".to_string(),
            bytes_downloaded: 512,
            total_bytes: Some(1024),
            fraction: 0.5,
        });

        reporter.report(ProgressEvent::DownloadRetrying {
            episode_id: "ep1".to_string(),
            episode_title: "Episode 1".to_string(),
            error: "Connection reset".to_string(),
            retries_left: 2,
        });

        reporter.report(ProgressEvent::DownloadCompleted {
            episode_id: "ep1".to_string(),
            episode_title: "Episode 1".to_string(),
            path: PathBuf::from("/tmp/ep1.mp3"),
            bytes_downloaded: 1024,
        });

        reporter.report(ProgressEvent::AlreadyDownloaded {
            episode_id: "ep1".to_string(),
            episode_title: "Episode 1".to_string(),
            path: PathBuf::from("/tmp/ep1.mp3"),
        });

        reporter.report(ProgressEvent::DownloadFailed {
            episode_id: "ep2".to_string(),
            episode_title: "Episode 2".to_string(),
            error: "Connection timeout".to_string(),
        });
    }

    #[test]
    fn recording_reporter_keeps_event_order() {
        let reporter = RecordingReporter::default();
        reporter.report(ProgressEvent::DownloadFailed {
            episode_id: "a".to_string(),
            episode_title: "A".to_string(),
            error: "boom".to_string(),
        });
        reporter.report(ProgressEvent::DownloadFailed {
            episode_id: "b".to_string(),
            episode_title: "B".to_string(),
            error: "boom".to_string(),
        });

        let events = reporter.events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], ProgressEvent::DownloadFailed { episode_id, .. } if episode_id == "b"));
    }
}
