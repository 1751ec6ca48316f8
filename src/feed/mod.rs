// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod fetch;
mod library;
mod parse;
mod text;

pub use fetch::{fetch_feed, is_url, load_feed, parse_feed_file};
pub use library::{FeedLibrary, FeedSubscription};
pub use parse::{FeedEpisode, Podcast, parse_feed};
pub use text::plain_text;
