// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Tags that end a line of text when rendered
const BREAKING_TAGS: &[&str] = &["br", "p", "/p", "div", "/div", "li", "/li", "h1", "h2", "h3"];

/// Reduce an HTML episode description to plain text for the terminal
///
/// Tags are dropped (block tags become line breaks), entities are decoded
/// and blank lines collapsed.
pub fn plain_text(html: &str) -> String {
    let mut stripped = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        stripped.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('>') else {
            // Unterminated tag: keep it as text
            stripped.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let tag = &rest[start + 1..start + len];
        if is_breaking(tag) {
            stripped.push('\n');
        }
        rest = &rest[start + len + 1..];
    }
    stripped.push_str(rest);

    let decoded = html_escape::decode_html_entities(&stripped);

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_breaking(tag: &str) -> bool {
    let name = tag
        .trim()
        .trim_end_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    BREAKING_TAGS.contains(&name.as_str())
}
