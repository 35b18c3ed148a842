//! External data sources, one [`Enricher`](crate::pipeline::Enricher) each.
//!
//! | Source | Module | Method | Produces |
//! |--------|--------|--------|----------|
//! | OMDb | [`omdb`] | JSON API by IMDb id | plot text (+ `.txt` file) |
//! | TMDB | [`tmdb`], [`metadata`] | find by IMDb id, then movie detail | poster image, director |
//! | OpenSubtitles | [`opensubtitles`] | search, download link, fetch | subtitle text (+ `.srt` file) |
//! | genderize.io | [`genderize`] | JSON API by first name | director gender fallback |
//! | Wikipedia | [`wikipedia`] | HTML scraping | box office figure |
//! | LLM | [`thematic`] | chat completion via `awful_aj` | thematic labels |
//!
//! Sources classify every outcome into an
//! [`EnrichError`](crate::error::EnrichError) so the pass loop can tell a
//! skip from a failure. Nothing here retries.

pub mod genderize;
pub mod metadata;
pub mod omdb;
pub mod opensubtitles;
pub mod thematic;
pub mod tmdb;
pub mod wikipedia;

use crate::error::EnrichError;
use reqwest::{Response, StatusCode};
use url::Url;

/// Resolve `path` against `base`, treating `base` as a directory.
pub fn endpoint(base: &str, path: &str) -> Result<Url, EnrichError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    Ok(base.join(path)?)
}

/// Map a non-success status to the matching error kind.
pub fn check_status(resp: Response, what: &str) -> Result<Response, EnrichError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(match status {
        StatusCode::NOT_FOUND => EnrichError::NotFound(format!("{what} returned 404")),
        StatusCode::TOO_MANY_REQUESTS => EnrichError::QuotaExceeded(format!("{what} returned 429")),
        _ => EnrichError::Network(format!("{what} returned status {status}")),
    })
}

/// Shared HTTP client for every source.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(user_agent).build()
}
