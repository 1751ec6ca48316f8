// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use sha2::{Digest, Sha256};
use url::Url;

use crate::model::Episode;

/// Maximum length of an id used verbatim as a filename stem
const MAX_STEM_LENGTH: usize = 100;

/// Length kept from a sanitized id before the digest suffix is appended
const MAX_SANITIZED_LENGTH: usize = 80;

/// Hex characters of the id digest appended to sanitized stems
const DIGEST_HEX_LENGTH: usize = 8;

/// Extension used when none can be sniffed from the audio URL
pub const FALLBACK_EXTENSION: &str = "mp3";

/// Check if a character is allowed in filenames (whitelist approach)
fn is_valid_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Derive the filename stem for an episode id
///
/// Ids that are already filesystem-safe are used as they are. Anything else
/// is sanitized and suffixed with a short digest of the raw id, so two
/// different ids never map to the same file.
pub fn filename_stem(episode_id: &str) -> String {
    if is_safe_stem(episode_id) {
        return episode_id.to_string();
    }

    let digest = id_digest(episode_id);
    let sanitized = sanitize_id(episode_id);

    if sanitized.is_empty() {
        digest
    } else {
        format!("{}-{}", sanitized, digest)
    }
}

/// Sniff the audio file extension from a URL or local path
///
/// Only known audio extensions are accepted; everything else falls back to
/// [`FALLBACK_EXTENSION`].
pub fn audio_extension(audio_url: &str) -> String {
    let last_segment = match Url::parse(audio_url) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(String::from),
        // Not a URL: treat it as a path, ignoring any query string
        Err(_) => audio_url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit(['/', '\\']).next())
            .map(String::from),
    };

    last_segment
        .as_deref()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| is_valid_audio_extension(ext))
        .map(|ext| ext.to_lowercase())
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// Generate the complete local filename for an episode (with extension)
pub fn episode_filename(episode: &Episode) -> String {
    format!(
        "{}.{}",
        filename_stem(&episode.id),
        audio_extension(&episode.audio_url)
    )
}

fn is_safe_stem(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_STEM_LENGTH
        && !id.starts_with('.')
        && id.chars().all(is_valid_filename_char)
}

fn id_digest(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    digest
        .iter()
        .take(DIGEST_HEX_LENGTH / 2)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Replace invalid characters, collapse runs of dashes and trim
fn sanitize_id(id: &str) -> String {
    let mut result = String::with_capacity(id.len());
    let mut last_was_separator = false;

    for c in id.chars() {
        if is_valid_filename_char(c) && c != '-' {
            result.push(c);
            last_was_separator = false;
        } else if !last_was_separator {
            result.push('-');
            last_was_separator = true;
        }
    }

    let trimmed = result.trim_matches(|c: char| c == '-' || c == '.');
    trimmed
        .chars()
        .take(MAX_SANITIZED_LENGTH)
        .collect::<String>()
        .trim_end_matches(['-', '.'])
        .to_string()
}

/// Check if a string is a valid audio file extension
fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}
