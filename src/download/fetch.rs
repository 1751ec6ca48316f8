// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::DownloadError;
use crate::http::HttpClient;

/// Byte counts reported after every chunk written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Bytes present in the file so far, including any resumed prefix
    pub written: u64,
    /// Expected final size, if the server announced one
    pub total: Option<u64>,
    /// Bytes that were already on disk when the request was made
    pub resumed_from: u64,
}

impl ChunkProgress {
    /// Fraction of the expected size written so far, clamped to [0, 1]
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some((self.written as f64 / total as f64).clamp(0.0, 1.0)),
        }
    }
}

/// Stream `url` into `path`, resuming from a non-empty file already at `path`
///
/// A resume is attempted with a `Range` request. If the server answers
/// `206 Partial Content` the body is appended, any other success status
/// restarts the file from zero. `on_chunk` is called once the response
/// headers arrive and after every chunk. Returns the final file size.
pub async fn fetch_to_file<C, F>(
    client: &C,
    url: &str,
    path: &Path,
    mut on_chunk: F,
) -> Result<u64, DownloadError>
where
    C: HttpClient + ?Sized,
    F: FnMut(ChunkProgress),
{
    let existing = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    };
    let range_start = (existing > 0).then_some(existing);

    let response = client
        .get_stream(url, range_start)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    // Check for HTTP errors
    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let resumed_from = if range_start.is_some() && response.is_partial() {
        existing
    } else {
        0
    };

    let mut file = open_target(path, resumed_from > 0).await?;
    if existing > 0 {
        debug!(
            url,
            existing,
            resumed = resumed_from > 0,
            "found partial download"
        );
    }

    let total = response.content_length.map(|len| len + resumed_from);
    let mut written = resumed_from;
    on_chunk(ChunkProgress {
        written,
        total,
        resumed_from,
    });

    let mut stream = response.body;
    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        written += chunk.len() as u64;
        on_chunk(ChunkProgress {
            written,
            total,
            resumed_from,
        });
    }

    // Ensure all data is flushed to disk
    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(written)
}

async fn open_target(path: &Path, append: bool) -> Result<File, DownloadError> {
    let result = if append {
        OpenOptions::new().append(true).open(path).await
    } else {
        File::create(path).await
    };

    result.map_err(|e| DownloadError::FileCreateFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockHttpClient;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fetch_writes_file_and_reports_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episode.mp3.partial");
        let client = MockHttpClient::new(b"test audio content");

        let mut seen = Vec::new();
        let written = fetch_to_file(&client, "https://example.com/episode.mp3", &path, |p| {
            seen.push(p)
        })
        .await
        .unwrap();

        assert_eq!(written, 18);
        assert_eq!(std::fs::read(&path).unwrap(), b"test audio content");
        // One report for the headers, then one per 4-byte chunk
        assert_eq!(seen.len(), 1 + 5);
        assert_eq!(seen.last().unwrap().fraction(), Some(1.0));
        assert!(seen.windows(2).all(|w| w[0].written <= w[1].written));
    }

    #[tokio::test]
    async fn fetch_fails_on_http_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episode.mp3.partial");
        let mut client = MockHttpClient::new(b"Not Found");
        client.status = 404;

        let result = fetch_to_file(&client, "https://example.com/ep.mp3", &path, |_| {}).await;

        match result.unwrap_err() {
            DownloadError::HttpStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got {other:?}"),
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn fetch_resumes_with_range_request() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episode.mp3.partial");
        std::fs::write(&path, b"0123").unwrap();

        let mut client = MockHttpClient::new(b"0123456789");
        client.supports_range = true;

        let mut first = None;
        let written = fetch_to_file(&client, "https://example.com/ep.mp3", &path, |p| {
            first.get_or_insert(p);
        })
        .await
        .unwrap();

        assert_eq!(written, 10);
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
        assert_eq!(client.requests.lock().as_slice(), &[Some(4)]);
        let first = first.unwrap();
        assert_eq!(first.resumed_from, 4);
        assert_eq!(first.total, Some(10));
    }

    #[tokio::test]
    async fn fetch_restarts_when_range_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episode.mp3.partial");
        std::fs::write(&path, b"stale-prefix").unwrap();

        let client = MockHttpClient::new(b"fresh");

        let written = fetch_to_file(&client, "https://example.com/ep.mp3", &path, |_| {})
            .await
            .unwrap();

        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"fresh");
    }

    #[test]
    fn fraction_is_none_without_total() {
        let progress = ChunkProgress {
            written: 10,
            total: None,
            resumed_from: 0,
        };
        assert_eq!(progress.fraction(), None);
    }

    #[test]
    fn fraction_is_clamped() {
        let progress = ChunkProgress {
            written: 20,
            total: Some(10),
            resumed_from: 0,
        };
        assert_eq!(progress.fraction(), Some(1.0));
    }
}
