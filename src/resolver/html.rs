// src/resolver/html.rs
// =============================================================================
// This module extracts media links from HTML pages.
//
// We use the `scraper` crate which:
// - Parses HTML into a DOM (Document Object Model)
// - Supports CSS selectors for finding elements
// - Is built on html5ever (Mozilla's HTML parser)
//
// Elements we look at:
// - <img src="...">
// - <video><source src="..."></video>
// - <a href="...">
//
// Every candidate is made absolute, then kept only if its path ends with a
// media extension and it has a usable file name.
// =============================================================================

use scraper::{Html, Selector};
use url::Url;

use super::media::{has_media_extension, MediaReference, DISCOVERED_EXTENSIONS};

const MEDIA_SELECTOR: &str = "img[src], video > source[src], a[href]";

// Extracts all media references from HTML content
//
// Parameters:
//   html: the HTML content to parse
//   page_url: the URL the page was fetched from (for resolving relative links)
//
// Returns: references in document order
//
// Example:
//   html = "<img src='/b.png'>"
//   page_url = "http://x.test/page.html"
//   result = [("http://x.test/b.png", "b.png")]
pub fn extract_media_links(html: &str, page_url: &Url) -> Vec<MediaReference> {
    let mut references = Vec::new();

    let document = Html::parse_document(html);

    // The selector is a constant, so parsing can only fail on a programming
    // error; bail out with nothing rather than panic.
    let Ok(selector) = Selector::parse(MEDIA_SELECTOR) else {
        return references;
    };

    let origin = origin_of(page_url);

    for element in document.select(&selector) {
        let value = element.value();
        let Some(link) = value.attr("src").or_else(|| value.attr("href")) else {
            continue;
        };

        let Some(absolute) = resolve_url(&origin, link.trim()) else {
            continue;
        };

        if !is_fetchable(&absolute) || !has_media_extension(&absolute, DISCOVERED_EXTENSIONS) {
            continue;
        }

        if let Some(reference) = MediaReference::from_url(&absolute) {
            references.push(reference);
        }
    }

    references
}

// Scheme, host and port of the page, with an empty path.
// "http://x.test:8080/gallery/page.html?id=3" -> "http://x.test:8080/"
fn origin_of(page_url: &Url) -> Url {
    let mut origin = page_url.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    origin
}

// Makes a link absolute.
//
// Links that already start with http:// or https:// are used as they are;
// anything else is resolved against the page origin, so both "/b.png" and
// "b.png" become "http://x.test/b.png".
fn resolve_url(origin: &Url, link: &str) -> Option<Url> {
    if link.is_empty() {
        return None;
    }

    let lower = link.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Url::parse(link).ok();
    }

    origin.join(link).ok()
}

// Skips data:, mailto:, javascript: and friends.
fn is_fetchable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. What does "video > source" mean?
//    - ">" is the CSS child combinator: a <source> whose direct parent is a
//      <video>. A <source> inside <picture> or <audio> does not match.
//
// 2. Why join against the origin and not the page URL?
//    - A bare "b.png" on "http://x.test/gallery/page.html" becomes
//      "http://x.test/b.png", not ".../gallery/b.png". Root-relative links
//      ("/b.png") come out the same either way.
//
// 3. What is let-else?
//    - `let Some(x) = maybe else { continue; };` binds x or leaves the
//      current iteration. It keeps the happy path unindented.
// -----------------------------------------------------------------------------
