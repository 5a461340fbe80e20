// src/resolver/mod.rs
// =============================================================================
// This module turns one input URL into the media files it refers to.
//
// Two cases:
// - The URL itself ends in a media extension -> it is the file, done.
//   No request is made.
// - Anything else is treated as an HTML page: fetch it once, pull out
//   <img>, <video><source> and <a> links that point at media files.
//   Only one hop is followed; discovered pages are never fetched.
//
// Resolution never fails to the caller. A page that can't be fetched or
// isn't HTML simply contributes no files; the reason goes to the log.
//
// Submodules:
// - media: MediaReference, extension sets, file names
// - html: link extraction with scraper
// =============================================================================

mod html;
mod media;

pub use html::extract_media_links;
pub use media::{
    basename, has_media_extension, MediaReference, DIRECT_EXTENSIONS, DISCOVERED_EXTENSIONS,
};

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ErrorKind, ResolveError};
use crate::fetch::{FetchClient, FetchError};

#[derive(Debug, Clone)]
pub struct UrlResolver {
    client: FetchClient,
    user_agent: String,
}

impl UrlResolver {
    pub fn new(client: FetchClient, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }

    // Resolves one input URL into zero or more media references.
    //
    // Errors are logged and turned into an empty list so one bad input never
    // affects the others.
    pub async fn resolve(&self, input: &str, cancel: &CancellationToken) -> Vec<MediaReference> {
        match self.try_resolve(input, cancel).await {
            Ok(references) => {
                debug!(url = input, found = references.len(), "resolved");
                references
            }
            Err(e) if e.kind() == ErrorKind::Cancelled => {
                debug!(url = input, "resolution cancelled");
                Vec::new()
            }
            Err(e) => {
                warn!(url = input, error = %e, "could not resolve URL");
                Vec::new()
            }
        }
    }

    pub async fn try_resolve(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<MediaReference>, ResolveError> {
        let url = Url::parse(input).map_err(|source| ResolveError::InvalidUrl {
            url: input.to_string(),
            source,
        })?;

        // Direct link: no request needed
        if has_media_extension(&url, DIRECT_EXTENSIONS) {
            return Ok(MediaReference::from_url(&url).into_iter().collect());
        }

        tokio::select! {
            result = self.fetch_page(&url) => result,
            _ = cancel.cancelled() => Err(ResolveError::Cancelled {
                url: input.to_string(),
            }),
        }
    }

    async fn fetch_page(&self, url: &Url) -> Result<Vec<MediaReference>, ResolveError> {
        let mut headers = HeaderMap::new();
        if let Ok(agent) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let fetched = self.client.get(url, headers).await.map_err(|e| match e {
            FetchError::Request(source) => ResolveError::Fetch {
                url: url.to_string(),
                source,
            },
            FetchError::PoolClosed => ResolveError::PoolClosed {
                url: url.to_string(),
            },
        })?;
        let response = fetched.response;

        if response.status() != StatusCode::OK {
            return Err(ResolveError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.starts_with("text/html") {
            return Err(ResolveError::NotHtml {
                url: url.to_string(),
                content_type,
            });
        }

        // Redirects may have moved us; relative links belong to the final page
        let page_url = response.url().clone();
        let body = response.text().await.map_err(|source| ResolveError::Fetch {
            url: url.to_string(),
            source,
        })?;

        Ok(extract_media_links(&body, &page_url))
    }
}
