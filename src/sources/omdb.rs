//! Plot descriptions from the OMDb API.
//!
//! One GET per movie: `?apikey=…&i=<imdb_id>&plot=full&r=json`. A body with
//! `"Response": "True"` and a non-empty `Plot` is a hit; anything else that
//! parses is a miss and the row is skipped. Each plot is also saved as
//! `<imdb_id>.txt` next to the combined CSV.

use crate::error::EnrichError;
use crate::models::{PRIMARY_KEY, Record, TITLE};
use crate::pipeline::Enricher;
use crate::sources::check_status;
use crate::utils::safe_file_stem;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Columns of `descriptions_all.csv`.
pub const COLUMNS: &[&str] = &[PRIMARY_KEY, TITLE, "plot"];

#[derive(Debug, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Response")]
    response: Option<String>,
    #[serde(rename = "Plot")]
    plot: Option<String>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

/// Fetches full plots by IMDb id.
#[derive(Debug)]
pub struct PlotSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    output_dir: PathBuf,
}

impl PlotSource {
    /// Create a plot source.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `base_url` - OMDb root, e.g. `http://www.omdbapi.com/`
    /// * `api_key` - OMDb API key
    /// * `output_dir` - Where `{imdb_id}.txt` files are written
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, output_dir: PathBuf) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            output_dir,
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_plot(&self, imdb_id: &str) -> Result<String, EnrichError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("i", imdb_id),
                ("plot", "full"),
                ("r", "json"),
            ])
            .send()
            .await?;
        let body: OmdbResponse = check_status(resp, "omdb")?
            .json()
            .await
            .map_err(|e| EnrichError::Parse(format!("omdb body: {e}")))?;

        if body.response.as_deref() != Some("True") {
            let reason = body.error.unwrap_or_else(|| "no result".into());
            if reason.to_lowercase().contains("limit") {
                return Err(EnrichError::QuotaExceeded(reason));
            }
            return Err(EnrichError::NotFound(format!("plot for {imdb_id}: {reason}")));
        }

        body.plot
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty() && p != "N/A")
            .ok_or_else(|| EnrichError::NotFound(format!("empty plot for {imdb_id}")))
    }
}

impl Enricher for PlotSource {
    fn source(&self) -> &'static str {
        "omdb"
    }

    fn columns(&self) -> &'static [&'static str] {
        COLUMNS
    }

    async fn enrich(&self, row: &Record) -> Result<Record, EnrichError> {
        let imdb_id = row
            .key()
            .ok_or_else(|| EnrichError::Skipped("no imdb_id".into()))?;

        let plot = self.fetch_plot(imdb_id).await?;

        fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("{}.txt", safe_file_stem(imdb_id)));
        fs::write(&path, &plot).await?;
        debug!(path = %path.display(), "Saved plot text");
        info!(imdb_id, title = row.title().unwrap_or(""), "Saved description");

        let mut out = Record::new();
        out.set(PRIMARY_KEY, imdb_id);
        out.set_opt(TITLE, row.title());
        out.set("plot", plot);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::load_csv;
    use crate::models::Dataset;
    use crate::outputs::tabular::write_merged;
    use crate::pipeline::{QuotaPolicy, RateLimiter, run_pass};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer, dir: &TempDir) -> PlotSource {
        PlotSource::new(
            reqwest::Client::new(),
            &server.uri(),
            "test-key",
            dir.path().join("descriptions"),
        )
    }

    async fn mount_plot(server: &MockServer, imdb_id: &str, plot: &str) {
        Mock::given(method("GET"))
            .and(query_param("i", imdb_id))
            .and(query_param("apikey", "test-key"))
            .and(query_param("plot", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Title": "Some Film",
                "Plot": plot,
                "Response": "True"
            })))
            .mount(server)
            .await;
    }

    fn sample(keys: &[&str]) -> Dataset {
        let mut d = Dataset::new([PRIMARY_KEY, TITLE]);
        for k in keys {
            d.push(Record::from_pairs([(PRIMARY_KEY, *k), (TITLE, &format!("Film {k}")[..])]));
        }
        d
    }

    #[tokio::test]
    async fn test_three_rows_one_missing() {
        let server = MockServer::start().await;
        mount_plot(&server, "tt001", "A farmer trains his daughters.").await;
        mount_plot(&server, "tt003", "Two friends take a road trip.").await;
        Mock::given(method("GET"))
            .and(query_param("i", "tt002"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let plots = source(&server, &dir);
        let report = run_pass(
            &plots,
            &sample(&["tt001", "tt002", "tt003"]),
            RateLimiter::new(Duration::ZERO),
            QuotaPolicy::Continue,
        )
        .await;

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].key, "tt002");
        assert!(report.failed.is_empty());

        let out = dir.path().join("descriptions/descriptions_all.csv");
        write_merged(&out, report.records, PRIMARY_KEY, plots.columns())
            .await
            .unwrap();

        let written = load_csv(&out).await.unwrap();
        assert_eq!(written.keys(), vec![Some("tt001"), Some("tt003")]);
        assert!(written.rows.iter().all(|r| r.get("plot").is_some()));
        assert_eq!(written.rows[0].title(), Some("Film tt001"));

        let txt = std::fs::read_to_string(dir.path().join("descriptions/tt003.txt")).unwrap();
        assert_eq!(txt, "Two friends take a road trip.");
    }

    #[tokio::test]
    async fn test_response_false_is_a_skip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": "False",
                "Error": "Incorrect IMDb ID."
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = source(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt404")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::NotFound(_)));
        assert!(err.is_skip());
    }

    #[tokio::test]
    async fn test_request_limit_is_quota() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": "False",
                "Error": "Request limit reached!"
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = source(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt1")]))
            .await
            .unwrap_err();
        assert!(err.is_quota());
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = source(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt1")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::Parse(_)));
    }

    #[tokio::test]
    async fn test_row_without_key_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = source(&server, &dir)
            .enrich(&Record::from_pairs([(TITLE, "Untitled")]))
            .await
            .unwrap_err();
        assert!(!err.made_call());
    }
}
