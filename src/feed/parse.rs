// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use rss::{Channel, Item};
use tracing::debug;
use url::Url;

use crate::error::FeedError;
use crate::model::Episode;

const UNTITLED: &str = "Untitled Episode";

/// Non-RFC 2822 date layouts seen in the wild
const FALLBACK_DATE_FORMATS: [&str; 3] = [
    "%a, %d %b %Y %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S %z",
];

/// A podcast as read from its RSS feed
#[derive(Debug, Clone)]
pub struct Podcast {
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub website: Option<String>,
    pub artwork_url: Option<String>,
    pub feed_url: Url,
    pub episodes: Vec<FeedEpisode>,
}

impl Podcast {
    pub fn episode(&self, id: &str) -> Option<&FeedEpisode> {
        self.episodes.iter().find(|item| item.episode.id == id)
    }
}

/// A feed item: the playable episode plus what only the feed knows about it
#[derive(Debug, Clone)]
pub struct FeedEpisode {
    pub episode: Episode,
    /// HTML as published, see [`plain_text`](crate::feed::plain_text)
    pub description: Option<String>,
    pub pub_date: Option<DateTime<FixedOffset>>,
    /// `itunes:duration` verbatim (`HH:MM:SS`, `MM:SS` or seconds)
    pub duration: Option<String>,
}

/// Parse RSS bytes fetched from `feed_url`
///
/// Items without an enclosure are skipped; the enclosure type is not
/// checked, so video feeds work too. Episode ids come from the
/// item guid, or from the enclosure URL when the guid is missing.
pub fn parse_feed(xml_bytes: &[u8], feed_url: Url) -> Result<Podcast, FeedError> {
    let channel = Channel::read_from(xml_bytes)?;
    let artwork_url = channel_artwork(&channel);

    let mut episodes = Vec::with_capacity(channel.items().len());
    for item in channel.items() {
        match feed_episode(item, &feed_url, artwork_url.as_deref()) {
            Ok(episode) => episodes.push(episode),
            Err(e) => debug!(feed = %feed_url, error = %e, "skipping feed item"),
        }
    }

    Ok(Podcast {
        title: channel.title().trim().to_string(),
        description: non_empty(channel.description()),
        author: channel
            .itunes_ext()
            .and_then(|ext| ext.author())
            .or(channel.managing_editor())
            .and_then(non_empty),
        website: Url::parse(channel.link()).ok().map(String::from),
        artwork_url,
        feed_url,
        episodes,
    })
}

fn channel_artwork(channel: &Channel) -> Option<String> {
    let rss_image = channel.image().map(|image| image.url());
    let itunes_image = channel.itunes_ext().and_then(|ext| ext.image());

    [rss_image, itunes_image]
        .into_iter()
        .flatten()
        .find_map(|candidate| Url::parse(candidate).ok())
        .map(String::from)
}

fn feed_episode(
    item: &Item,
    feed_url: &Url,
    channel_artwork: Option<&str>,
) -> Result<FeedEpisode, FeedError> {
    let title = item
        .title()
        .and_then(non_empty)
        .unwrap_or_else(|| UNTITLED.to_string());

    let enclosure = item
        .enclosure()
        .ok_or_else(|| FeedError::MissingEnclosure {
            title: title.clone(),
        })?;
    let audio_url = Url::parse(enclosure.url())?;

    let id = item
        .guid()
        .and_then(|guid| non_empty(guid.value()))
        .unwrap_or_else(|| audio_url.to_string());

    let itunes = item.itunes_ext();
    let image_url = itunes
        .and_then(|ext| ext.image())
        .map(String::from)
        .or_else(|| channel_artwork.map(String::from));

    Ok(FeedEpisode {
        episode: Episode {
            id,
            title,
            audio_url: audio_url.into(),
            image_url,
            feed_url: Some(feed_url.to_string()),
        },
        description: item.description().and_then(non_empty),
        pub_date: item.pub_date().and_then(parse_pub_date),
        duration: itunes.and_then(|ext| ext.duration()).and_then(non_empty),
    })
}

fn parse_pub_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw).ok().or_else(|| {
        FALLBACK_DATE_FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(raw, format).ok())
    })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
