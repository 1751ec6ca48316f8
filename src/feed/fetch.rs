// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use tracing::debug;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{Podcast, parse_feed};

/// Fetch and parse a podcast feed from a URL
pub async fn fetch_feed<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Podcast, FeedError> {
    let feed_url = Url::parse(url)?;
    debug!(url, "fetching feed");

    let bytes = client
        .get_bytes(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    parse_feed(&bytes, feed_url)
}

/// Parse a podcast feed from a local file
pub fn parse_feed_file(path: &Path) -> Result<Podcast, FeedError> {
    let bytes = std::fs::read(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_feed(&bytes, file_path_to_url(path))
}

/// Load a feed from either a URL or a local file path
pub async fn load_feed<C: HttpClient + ?Sized>(client: &C, source: &str) -> Result<Podcast, FeedError> {
    if is_url(source) {
        fetch_feed(client, source).await
    } else {
        parse_feed_file(Path::new(source))
    }
}

/// Construct a file:// URL for a local file path
fn file_path_to_url(path: &Path) -> Url {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Url::from_file_path(&absolute).unwrap_or_else(|_| {
        // Only reachable for odd paths on exotic platforms
        Url::parse("file:///").expect("static URL is valid")
    })
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
