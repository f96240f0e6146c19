//! Manifest parsing and local file naming.

use url::Url;

/// Item URLs listed in a manifest body: one per line, trimmed, blanks
/// dropped.
#[must_use]
pub fn parse_manifest(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Local file name for an item: the last path segment of its URL, without
/// the query string. `None` when the URL yields no usable name.
#[must_use]
pub fn file_name_for(item_url: &str) -> Option<String> {
    let url = Url::parse(item_url).ok()?;
    let segment = url.path_segments()?.next_back()?;
    match segment {
        "" | "." | ".." => None,
        name if name.contains(['\\', '\0']) => None,
        name => Some(name.to_string()),
    }
}
