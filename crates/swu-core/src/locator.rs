//! Locator handling: destination filenames and `file://` references.
//!
//! A locator is either a network URL (downloaded) or a `file://` reference
//! to a pre-existing local artifact (bypasses the download engine entirely
//! and is never deleted by it).

use std::path::PathBuf;

/// Default filename when the URL path has no usable last segment.
pub const DEFAULT_FILENAME: &str = "update.bin";

/// Derives the destination filename from the last non-empty path segment of
/// the URL. Falls back to [`DEFAULT_FILENAME`] for empty or degenerate
/// paths.
pub fn filename_from_url(url: &str) -> String {
    let segment = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path()
                .split('/')
                .filter(|s| !s.is_empty())
                .last()
                .map(str::to_string)
        });
    match segment {
        Some(s) if s != "." && s != ".." => s,
        _ => DEFAULT_FILENAME.to_string(),
    }
}

/// Returns the local path for a `file://` locator, `None` for any other
/// scheme or an unparseable URL.
pub fn local_path(locator: &str) -> Option<PathBuf> {
    let parsed = url::Url::parse(locator).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }
    parsed.to_file_path().ok()
}
