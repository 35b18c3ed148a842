//! English subtitles from the OpenSubtitles REST API.
//!
//! Three calls per movie:
//! 1. `GET subtitles` searching by IMDb id when the key looks like one,
//!    otherwise by title
//! 2. `POST download` with the best hit's first `file_id` to get a
//!    short-lived link
//! 3. `GET <link>` for the `.srt` bytes
//!
//! "Best" is the hit with the highest download count; ties keep the first.

use crate::error::EnrichError;
use crate::models::{PRIMARY_KEY, Record, TITLE};
use crate::pipeline::Enricher;
use crate::sources::{check_status, endpoint};
use crate::utils::{looks_like_imdb_id, safe_file_stem};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::cmp::Reverse;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Columns of `subtitles_all.csv`.
pub const COLUMNS: &[&str] = &[PRIMARY_KEY, TITLE, "subtitle_text"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    attributes: HitAttributes,
}

#[derive(Debug, Deserialize)]
struct HitAttributes {
    #[serde(default)]
    download_count: u64,
    #[serde(default)]
    files: Vec<SubtitleFile>,
}

#[derive(Debug, Deserialize)]
struct SubtitleFile {
    file_id: u64,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    link: Option<String>,
}

/// How a movie is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleQuery<'a> {
    ImdbId(&'a str),
    Title(&'a str),
}

impl<'a> SubtitleQuery<'a> {
    /// IMDb id when the key has the `tt<digits>` shape, else the title.
    pub fn for_row(row: &'a Record) -> Option<Self> {
        match (row.key(), row.title()) {
            (Some(id), _) if looks_like_imdb_id(id) => Some(Self::ImdbId(id)),
            (_, Some(title)) => Some(Self::Title(title)),
            _ => None,
        }
    }

    fn param(&self) -> (&'static str, &'a str) {
        match self {
            Self::ImdbId(id) => ("imdb_id", *id),
            Self::Title(title) => ("query", *title),
        }
    }
}

/// Enricher that downloads the most popular English subtitle per movie.
#[derive(Debug)]
pub struct SubtitleSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    user_agent: String,
    output_dir: PathBuf,
}

impl SubtitleSource {
    /// Create a subtitle source.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `base_url` - API root, e.g. `https://api.opensubtitles.com/api/v1/`
    /// * `api_key` - Sent as the `Api-Key` header
    /// * `user_agent` - Sent as the `User-Agent` header
    /// * `output_dir` - Where `.srt` files are written
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, user_agent: &str, output_dir: PathBuf) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            user_agent: user_agent.to_string(),
            output_dir,
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn best_file_id(&self, query: &SubtitleQuery<'_>) -> Result<u64, EnrichError> {
        let url = endpoint(&self.base_url, "subtitles")?;
        let resp = self
            .client
            .get(url)
            .header("Api-Key", &self.api_key)
            .header("User-Agent", &self.user_agent)
            .query(&[
                ("languages", "en"),
                ("order_by", "download_count"),
                ("order_direction", "desc"),
                ("type", "movie"),
                query.param(),
            ])
            .send()
            .await?;
        let body: SearchResponse = check_status(resp, "subtitle search")?
            .json()
            .await
            .map_err(|e| EnrichError::Parse(format!("subtitle search body: {e}")))?;

        let best = body
            .data
            .iter()
            .enumerate()
            .max_by_key(|(i, hit)| (hit.attributes.download_count, Reverse(*i)))
            .map(|(_, hit)| hit)
            .ok_or_else(|| EnrichError::NotFound(format!("no subtitles for {query:?}")))?;

        best.attributes
            .files
            .first()
            .map(|f| f.file_id)
            .ok_or_else(|| EnrichError::NotFound(format!("subtitle for {query:?} has no downloadable file")))
    }

    #[instrument(level = "debug", skip(self))]
    async fn download_link(&self, file_id: u64) -> Result<String, EnrichError> {
        let url = endpoint(&self.base_url, "download")?;
        let resp = self
            .client
            .post(url)
            .header("Api-Key", &self.api_key)
            .header("User-Agent", &self.user_agent)
            .json(&json!({ "file_id": file_id }))
            .send()
            .await?;
        // 406 is the daily download allowance running out
        if resp.status() == StatusCode::NOT_ACCEPTABLE {
            return Err(EnrichError::QuotaExceeded("subtitle download allowance used up".into()));
        }
        let body: DownloadResponse = check_status(resp, "subtitle download")?
            .json()
            .await
            .map_err(|e| EnrichError::Parse(format!("subtitle download body: {e}")))?;
        body.link
            .filter(|l| !l.is_empty())
            .ok_or_else(|| EnrichError::NotFound(format!("no download link for file {file_id}")))
    }
}

impl Enricher for SubtitleSource {
    fn source(&self) -> &'static str {
        "opensubtitles"
    }

    fn columns(&self) -> &'static [&'static str] {
        COLUMNS
    }

    async fn enrich(&self, row: &Record) -> Result<Record, EnrichError> {
        let query = SubtitleQuery::for_row(row)
            .ok_or_else(|| EnrichError::Skipped("neither imdb_id nor title".into()))?;

        let file_id = self.best_file_id(&query).await?;
        let link = self.download_link(file_id).await?;
        let resp = self.client.get(&link).send().await?;
        let bytes = check_status(resp, "subtitle file")?.bytes().await?;

        let stem = safe_file_stem(row.key().or(row.title()).unwrap_or("untitled"));
        fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("{stem}.srt"));
        fs::write(&path, &bytes).await?;
        debug!(file_id, bytes = bytes.len(), "Downloaded subtitle");
        info!(path = %path.display(), "Subtitle saved");

        let mut out = Record::new();
        out.set_opt(PRIMARY_KEY, row.key());
        out.set_opt(TITLE, row.title());
        out.set("subtitle_text", String::from_utf8_lossy(&bytes));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SRT: &str = "1\n00:00:01,000 --> 00:00:03,000\nAll is well.\n";

    fn source(server: &MockServer, dir: &TempDir) -> SubtitleSource {
        SubtitleSource::new(
            reqwest::Client::new(),
            &server.uri(),
            "sub-key",
            "film_enrich test",
            dir.path().join("subtitles"),
        )
    }

    async fn mount_download(server: &MockServer, file_id: u64) {
        Mock::given(method("POST"))
            .and(path("/download"))
            .and(header("Api-Key", "sub-key"))
            .and(body_json(json!({ "file_id": file_id })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "link": format!("{}/files/{file_id}.srt", server.uri())
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/files/{file_id}.srt")))
            .respond_with(ResponseTemplate::new(200).set_body_string(SRT))
            .mount(server)
            .await;
    }

    #[test]
    fn test_query_prefers_well_formed_imdb_id() {
        let by_id = Record::from_pairs([(PRIMARY_KEY, "tt1187043"), (TITLE, "3 Idiots")]);
        assert_eq!(SubtitleQuery::for_row(&by_id), Some(SubtitleQuery::ImdbId("tt1187043")));

        let odd_key = Record::from_pairs([(PRIMARY_KEY, "1187043"), (TITLE, "3 Idiots")]);
        assert_eq!(SubtitleQuery::for_row(&odd_key), Some(SubtitleQuery::Title("3 Idiots")));

        let no_key = Record::from_pairs([(TITLE, "Lagaan")]);
        assert_eq!(SubtitleQuery::for_row(&no_key), Some(SubtitleQuery::Title("Lagaan")));

        assert_eq!(SubtitleQuery::for_row(&Record::new()), None);
    }

    #[tokio::test]
    async fn test_picks_most_downloaded_and_saves_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subtitles"))
            .and(query_param("imdb_id", "tt001"))
            .and(query_param("languages", "en"))
            .and(query_param("order_by", "download_count"))
            .and(header("Api-Key", "sub-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
                { "attributes": { "download_count": 10, "files": [{ "file_id": 1 }] } },
                { "attributes": { "download_count": 900, "files": [{ "file_id": 2 }, { "file_id": 3 }] } },
                { "attributes": { "download_count": 900, "files": [{ "file_id": 4 }] } }
            ]})))
            .mount(&server)
            .await;
        mount_download(&server, 2).await;

        let dir = TempDir::new().unwrap();
        let row = Record::from_pairs([(PRIMARY_KEY, "tt001"), (TITLE, "3 Idiots")]);
        let out = source(&server, &dir).enrich(&row).await.unwrap();

        assert_eq!(out.get("subtitle_text"), Some(SRT));
        assert_eq!(out.key(), Some("tt001"));
        let saved = std::fs::read_to_string(dir.path().join("subtitles/tt001.srt")).unwrap();
        assert_eq!(saved, SRT);
    }

    #[tokio::test]
    async fn test_title_search_and_safe_file_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subtitles"))
            .and(query_param("query", "Kal Ho: Naa Ho"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
                { "attributes": { "download_count": 3, "files": [{ "file_id": 8 }] } }
            ]})))
            .mount(&server)
            .await;
        mount_download(&server, 8).await;

        let dir = TempDir::new().unwrap();
        let row = Record::from_pairs([(TITLE, "Kal Ho: Naa Ho")]);
        let out = source(&server, &dir).enrich(&row).await.unwrap();

        assert_eq!(out.key(), None);
        assert_eq!(out.title(), Some("Kal Ho: Naa Ho"));
        assert!(dir.path().join("subtitles/Kal Ho- Naa Ho.srt").exists());
    }

    #[tokio::test]
    async fn test_empty_search_is_skip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subtitles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = source(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt002")]))
            .await
            .unwrap_err();
        assert!(err.is_skip());
    }

    #[tokio::test]
    async fn test_hit_without_files_is_skip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subtitles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
                { "attributes": { "download_count": 3, "files": [] } }
            ]})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = source(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt003")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_download_allowance_is_quota() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subtitles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
                { "attributes": { "download_count": 3, "files": [{ "file_id": 5 }] } }
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/download"))
            .respond_with(ResponseTemplate::new(406))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = source(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt004")]))
            .await
            .unwrap_err();
        assert!(err.is_quota());
    }

    #[tokio::test]
    async fn test_search_server_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = source(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt005")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::Network(_)));
        assert!(!err.is_skip());
    }
}
