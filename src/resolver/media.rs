// src/resolver/media.rs
// =============================================================================
// Media references and the rules for recognizing media URLs.
//
// Two extension sets exist on purpose:
// - DIRECT_EXTENSIONS is used when an input URL itself points at a file
// - DISCOVERED_EXTENSIONS is used for links found inside an HTML page, and
//   leaves out .m4v
//
// Matching is done on the URL's *path*, so query strings like
// "photo.jpg?size=large" still count as a .jpg.
// =============================================================================

use serde::Serialize;
use url::Url;

/// Extensions accepted when the input URL itself is the media file.
pub const DIRECT_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".mp4", ".avi", ".mov", ".m4v",
];

/// Extensions accepted for links discovered in an HTML page.
pub const DISCOVERED_EXTENSIONS: &[&str] =
    &[".jpg", ".jpeg", ".png", ".gif", ".mp4", ".avi", ".mov"];

/// A media file to download: where it comes from and what to call it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MediaReference {
    pub url: String,
    pub filename: String,
}

impl MediaReference {
    // Builds a reference from a URL, or None if the URL has no basename
    // (e.g. "http://x.test/" or "http://x.test/dir/").
    pub fn from_url(url: &Url) -> Option<Self> {
        let filename = basename(url)?;
        Some(Self {
            url: url.to_string(),
            filename,
        })
    }
}

// True if the URL's path ends with one of the given extensions.
pub fn has_media_extension(url: &Url, extensions: &[&str]) -> bool {
    let path = url.path().to_ascii_lowercase();
    extensions.iter().any(|ext| path.ends_with(ext))
}

// Last path segment of the URL, used as the local file name.
//
// Escapes like %20 are decoded so "my%20cat.jpg" is saved as "my cat.jpg".
// If decoding would produce a path separator (or isn't valid UTF-8) the
// segment is kept as-is, so a name can never escape the destination folder.
pub fn basename(url: &Url) -> Option<String> {
    let raw = url.path_segments()?.next_back()?;
    if raw.is_empty() {
        return None;
    }

    let name = match urlencoding::decode(raw) {
        Ok(decoded) if !decoded.contains(['/', '\\']) => decoded.into_owned(),
        _ => raw.to_string(),
    };

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name)
}
