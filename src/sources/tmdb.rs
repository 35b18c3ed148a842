//! TMDB lookups: IMDb id → TMDB movie id → movie detail.
//!
//! [`TmdbClient`] is shared by the poster stage (this module) and the
//! metadata stage ([`crate::sources::metadata`]). Posters are downloaded
//! from the image host and saved as `<imdb_id>.jpg`.

use crate::error::EnrichError;
use crate::models::{PRIMARY_KEY, Record, TITLE};
use crate::pipeline::Enricher;
use crate::sources::{check_status, endpoint};
use crate::utils::safe_file_stem;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Columns of `posters_all.csv`.
pub const POSTER_COLUMNS: &[&str] = &[PRIMARY_KEY, TITLE, "poster_path"];

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<FindResult>,
}

#[derive(Debug, Deserialize)]
struct FindResult {
    id: u64,
}

/// The parts of `/movie/{id}` we use.
#[derive(Debug, Default, Deserialize)]
pub struct MovieDetails {
    pub poster_path: Option<String>,
    #[serde(default)]
    pub credits: Credits,
}

/// `credits` block appended to a movie detail response.
#[derive(Debug, Default, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

/// One crew entry. TMDB gender codes: 0 unknown, 1 female, 2 male.
#[derive(Debug, Clone, Deserialize)]
pub struct CrewMember {
    pub name: Option<String>,
    pub job: Option<String>,
    /// 0 unknown, 1 female, 2 male, 3 non-binary.
    #[serde(default)]
    pub gender: Option<u8>,
}

impl MovieDetails {
    /// The first crew member credited as director.
    pub fn director(&self) -> Option<&CrewMember> {
        self.credits
            .crew
            .iter()
            .find(|c| c.job.as_deref() == Some("Director"))
    }
}

impl CrewMember {
    /// `female` or `male` for TMDB codes 1 and 2, otherwise `None`.
    pub fn gender_label(&self) -> Option<&'static str> {
        match self.gender {
            Some(1) => Some("female"),
            Some(2) => Some("male"),
            _ => None,
        }
    }
}

/// Minimal TMDB v3 client: IMDb id lookup and movie detail.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TmdbClient {
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `base_url` - API root, e.g. `https://api.themoviedb.org/3/`
    /// * `api_key` - Sent as the `api_key` query parameter
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Resolve an IMDb id to TMDB's numeric movie id.
    #[instrument(level = "debug", skip(self))]
    pub async fn find_movie_id(&self, imdb_id: &str) -> Result<u64, EnrichError> {
        let url = endpoint(&self.base_url, &format!("find/{imdb_id}"))?;
        let resp = self
            .client
            .get(url)
            .query(&[("api_key", self.api_key.as_str()), ("external_source", "imdb_id")])
            .send()
            .await?;
        let body: FindResponse = check_status(resp, "tmdb find")?
            .json()
            .await
            .map_err(|e| EnrichError::Parse(format!("tmdb find body: {e}")))?;

        body.movie_results
            .first()
            .map(|m| m.id)
            .ok_or_else(|| EnrichError::NotFound(format!("no TMDB movie for {imdb_id}")))
    }

    /// Fetch movie detail, optionally with credits appended.
    #[instrument(level = "debug", skip(self))]
    pub async fn movie_details(&self, tmdb_id: u64, with_credits: bool) -> Result<MovieDetails, EnrichError> {
        let url = endpoint(&self.base_url, &format!("movie/{tmdb_id}"))?;
        let mut query = vec![("api_key", self.api_key.as_str())];
        if with_credits {
            query.push(("append_to_response", "credits"));
        }
        let resp = self.client.get(url).query(&query).send().await?;
        check_status(resp, "tmdb movie")?
            .json()
            .await
            .map_err(|e| EnrichError::Parse(format!("tmdb movie body: {e}")))
    }
}

/// Downloads a poster per movie.
#[derive(Debug)]
pub struct PosterSource {
    tmdb: TmdbClient,
    client: reqwest::Client,
    image_base: String,
    output_dir: PathBuf,
    /// Prefix for the `poster_path` column, relative to the data dir.
    relative_dir: PathBuf,
}

impl PosterSource {
    /// Create a poster source.
    ///
    /// # Arguments
    ///
    /// * `tmdb` - Resolves the movie and its poster path
    /// * `client` - Used to download the image itself
    /// * `image_base` - Image host prefix, e.g. `https://image.tmdb.org/t/p/w500`
    /// * `output_dir` - Where `{imdb_id}.jpg` files are written
    /// * `relative_dir` - `output_dir` relative to the data dir, recorded in `poster_path`
    pub fn new(
        tmdb: TmdbClient,
        client: reqwest::Client,
        image_base: &str,
        output_dir: PathBuf,
        relative_dir: PathBuf,
    ) -> Self {
        Self {
            tmdb,
            client,
            image_base: image_base.trim_end_matches('/').to_string(),
            output_dir,
            relative_dir,
        }
    }
}

impl Enricher for PosterSource {
    fn source(&self) -> &'static str {
        "tmdb_posters"
    }

    fn columns(&self) -> &'static [&'static str] {
        POSTER_COLUMNS
    }

    async fn enrich(&self, row: &Record) -> Result<Record, EnrichError> {
        let imdb_id = row
            .key()
            .ok_or_else(|| EnrichError::Skipped("no imdb_id".into()))?;

        let tmdb_id = self.tmdb.find_movie_id(imdb_id).await?;
        let details = self.tmdb.movie_details(tmdb_id, false).await?;
        let poster_path = details
            .poster_path
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| EnrichError::NotFound(format!("no poster path for {imdb_id}")))?;

        let poster_url = format!("{}/{}", self.image_base, poster_path.trim_start_matches('/'));
        let resp = self.client.get(&poster_url).send().await?;
        let bytes = check_status(resp, "poster image")?.bytes().await?;

        let filename = format!("{}.jpg", safe_file_stem(imdb_id));
        fs::create_dir_all(&self.output_dir).await?;
        let save_path = self.output_dir.join(&filename);
        fs::write(&save_path, &bytes).await?;
        debug!(url = %poster_url, bytes = bytes.len(), "Downloaded poster");
        info!(path = %save_path.display(), "Poster saved");

        let mut out = Record::new();
        out.set(PRIMARY_KEY, imdb_id);
        out.set_opt(TITLE, row.title());
        out.set("poster_path", self.relative_dir.join(filename).to_string_lossy());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_find(server: &MockServer, imdb_id: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/find/{imdb_id}")))
            .and(query_param("external_source", "imdb_id"))
            .and(query_param("api_key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn posters(server: &MockServer, dir: &TempDir) -> PosterSource {
        let client = reqwest::Client::new();
        PosterSource::new(
            TmdbClient::new(client.clone(), &server.uri(), "k"),
            client,
            &format!("{}/img/w500", server.uri()),
            dir.path().join("posters"),
            PathBuf::from("posters"),
        )
    }

    #[test]
    fn test_director_and_gender_label() {
        let details: MovieDetails = serde_json::from_value(json!({
            "poster_path": "/p.jpg",
            "credits": { "crew": [
                { "name": "A Writer", "job": "Screenplay", "gender": 2 },
                { "name": "Zoya Akhtar", "job": "Director", "gender": 1 },
                { "name": "Second", "job": "Director", "gender": 2 }
            ]}
        }))
        .unwrap();
        let director = details.director().unwrap();
        assert_eq!(director.name.as_deref(), Some("Zoya Akhtar"));
        assert_eq!(director.gender_label(), Some("female"));

        let unknown = CrewMember { name: None, job: None, gender: Some(0) };
        assert_eq!(unknown.gender_label(), None);
    }

    #[tokio::test]
    async fn test_poster_two_step_lookup_and_download() {
        let server = MockServer::start().await;
        mount_find(&server, "tt001", json!({ "movie_results": [{ "id": 77 }] })).await;
        Mock::given(method("GET"))
            .and(path("/movie/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "poster_path": "/abc.jpg" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img/w500/abc.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let row = Record::from_pairs([(PRIMARY_KEY, "tt001"), (TITLE, "Queen")]);
        let out = posters(&server, &dir).enrich(&row).await.unwrap();

        assert_eq!(out.get("poster_path"), Some("posters/tt001.jpg"));
        assert_eq!(out.title(), Some("Queen"));
        let bytes = std::fs::read(dir.path().join("posters/tt001.jpg")).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_no_tmdb_match_is_skip() {
        let server = MockServer::start().await;
        mount_find(&server, "tt404", json!({ "movie_results": [] })).await;

        let dir = TempDir::new().unwrap();
        let err = posters(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt404")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_poster_path_is_skip() {
        let server = MockServer::start().await;
        mount_find(&server, "tt002", json!({ "movie_results": [{ "id": 5 }] })).await;
        Mock::given(method("GET"))
            .and(path("/movie/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "poster_path": null })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = posters(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt002")]))
            .await
            .unwrap_err();
        assert!(err.is_skip());
        assert!(!dir.path().join("posters/tt002.jpg").exists());
    }

    #[tokio::test]
    async fn test_tmdb_rate_limit_is_quota() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = posters(&server, &dir)
            .enrich(&Record::from_pairs([(PRIMARY_KEY, "tt003")]))
            .await
            .unwrap_err();
        assert!(err.is_quota());
    }
}
