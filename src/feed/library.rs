// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::FeedError;
use crate::http::HttpClient;
use crate::store::{FEEDS_KEY, PersistedList, SharedStore};

use super::fetch::fetch_feed;

/// A feed the user follows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSubscription {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// The user's feed subscriptions, unique by URL
pub struct FeedLibrary {
    feeds: PersistedList<FeedSubscription>,
}

impl FeedLibrary {
    pub async fn load(store: SharedStore) -> Self {
        Self {
            feeds: PersistedList::load(store, FEEDS_KEY).await,
        }
    }

    pub fn subscriptions(&self) -> Vec<FeedSubscription> {
        self.feeds.snapshot()
    }

    pub fn get(&self, url: &str) -> Option<FeedSubscription> {
        self.feeds
            .read(|feeds| feeds.iter().find(|f| f.url == url).cloned())
    }

    /// Subscribe to a feed
    ///
    /// The feed is fetched once so the subscription carries its title; a URL
    /// that does not yield a valid feed is not added. Subscribing twice
    /// returns the existing entry without fetching.
    pub async fn add<C: HttpClient + ?Sized>(
        &self,
        client: &C,
        url: &str,
    ) -> Result<FeedSubscription, FeedError> {
        if let Some(existing) = self.get(url) {
            return Ok(existing);
        }

        let podcast = fetch_feed(client, url).await?;
        let subscription = FeedSubscription {
            url: url.to_string(),
            title: podcast.title,
            description: podcast.description,
            added_at: Utc::now(),
        };

        let stored = self
            .feeds
            .update(|feeds| match feeds.iter().find(|f| f.url == url) {
                Some(existing) => existing.clone(),
                None => {
                    feeds.push(subscription.clone());
                    subscription
                }
            })
            .await?;

        info!(url, title = %stored.title, "subscribed to feed");
        Ok(stored)
    }

    /// Unsubscribe from a feed, returning whether it was subscribed
    pub async fn remove(&self, url: &str) -> Result<bool, FeedError> {
        if self.get(url).is_none() {
            return Ok(false);
        }

        self.feeds
            .update(|feeds| feeds.retain(|f| f.url != url))
            .await?;
        info!(url, "unsubscribed from feed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Esports Report</title>
    <description>Weekly news</description>
    <item>
      <title>One</title>
      <enclosure url="https://example.com/1.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    #[derive(Default)]
    struct FeedClient {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for FeedClient {
        async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(FEED.as_bytes()))
        }

        async fn get_stream(
            &self,
            _url: &str,
            _range_start: Option<u64>,
        ) -> Result<HttpResponse, reqwest::Error> {
            unreachable!("feeds are fetched as bytes")
        }
    }

    #[tokio::test]
    async fn add_captures_feed_title() {
        let library = FeedLibrary::load(MemoryStore::shared()).await;
        let client = FeedClient::default();

        let sub = library
            .add(&client, "https://example.com/feed.xml")
            .await
            .unwrap();

        assert_eq!(sub.title, "Esports Report");
        assert_eq!(sub.description.as_deref(), Some("Weekly news"));
        assert_eq!(library.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn adding_twice_does_not_duplicate_or_refetch() {
        let library = FeedLibrary::load(MemoryStore::shared()).await;
        let client = FeedClient::default();

        library.add(&client, "https://example.com/feed.xml").await.unwrap();
        library.add(&client, "https://example.com/feed.xml").await.unwrap();

        assert_eq!(library.subscriptions().len(), 1);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_url_is_not_added() {
        let library = FeedLibrary::load(MemoryStore::shared()).await;
        let client = FeedClient::default();

        let result = library.add(&client, "not a url").await;
        assert!(matches!(result, Err(FeedError::InvalidUrl(_))));
        assert!(library.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn remove_reports_whether_subscribed() {
        let store = MemoryStore::shared();
        let library = FeedLibrary::load(store.clone()).await;
        let client = FeedClient::default();
        library.add(&client, "https://example.com/feed.xml").await.unwrap();

        assert!(library.remove("https://example.com/feed.xml").await.unwrap());
        assert!(!library.remove("https://example.com/feed.xml").await.unwrap());

        let reloaded = FeedLibrary::load(store).await;
        assert!(reloaded.subscriptions().is_empty());
    }
}
