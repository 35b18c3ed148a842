//! Director, director gender and box office per movie.
//!
//! The row succeeds once TMDB resolves the movie. Gender falls back to
//! genderize.io when TMDB has none, and box office comes from the row's
//! `wiki_link` page; failures of either fallback are logged and leave the
//! field empty.

use crate::error::EnrichError;
use crate::models::{PRIMARY_KEY, Record};
use crate::pipeline::Enricher;
use crate::sources::genderize::GenderizeClient;
use crate::sources::tmdb::TmdbClient;
use crate::sources::wikipedia::fetch_box_office;
use tracing::{info, warn};

/// Columns of `metadata_extended.csv`.
pub const COLUMNS: &[&str] = &[PRIMARY_KEY, "title", "director", "director_gender", "box_office"];

/// Sample column holding the movie's Wikipedia URL.
pub const WIKI_LINK: &str = "wiki_link";

/// Enricher producing director, director gender and box office.
#[derive(Debug)]
pub struct MetadataSource {
    tmdb: TmdbClient,
    genderize: GenderizeClient,
    client: reqwest::Client,
}

impl MetadataSource {
    /// # Arguments
    ///
    /// * `tmdb` - Resolves the movie and its credits
    /// * `genderize` - Gender fallback when TMDB has none
    /// * `client` - Used to fetch the Wikipedia page
    pub fn new(tmdb: TmdbClient, genderize: GenderizeClient, client: reqwest::Client) -> Self {
        Self {
            tmdb,
            genderize,
            client,
        }
    }

    async fn director_gender(&self, imdb_id: &str, name: Option<&str>, tmdb_label: Option<&str>) -> Option<String> {
        if let Some(label) = tmdb_label {
            return Some(label.to_string());
        }
        let name = name?;
        match self.genderize.infer(name).await {
            Ok(gender) => gender,
            Err(e) => {
                warn!(imdb_id, director = name, error = %e, "Gender fallback failed");
                None
            }
        }
    }

    async fn box_office(&self, imdb_id: &str, row: &Record) -> Option<String> {
        let link = row.get(WIKI_LINK)?;
        match fetch_box_office(&self.client, link).await {
            Ok(value) => value,
            Err(e) => {
                warn!(imdb_id, url = link, error = %e, "Box office scrape failed");
                None
            }
        }
    }
}

impl Enricher for MetadataSource {
    fn source(&self) -> &'static str {
        "tmdb_metadata"
    }

    fn columns(&self) -> &'static [&'static str] {
        COLUMNS
    }

    async fn enrich(&self, row: &Record) -> Result<Record, EnrichError> {
        let imdb_id = row
            .key()
            .ok_or_else(|| EnrichError::Skipped("no imdb_id".into()))?;

        let tmdb_id = self.tmdb.find_movie_id(imdb_id).await?;
        let details = self.tmdb.movie_details(tmdb_id, true).await?;

        let director = details.director();
        let director_name = director.and_then(|d| d.name.as_deref());
        let gender = self
            .director_gender(imdb_id, director_name, director.and_then(|d| d.gender_label()))
            .await;
        let box_office = self.box_office(imdb_id, row).await;

        info!(
            imdb_id,
            director = director_name.unwrap_or(""),
            gender = gender.as_deref().unwrap_or(""),
            box_office = box_office.as_deref().unwrap_or(""),
            "Collected metadata"
        );

        let mut out = Record::new();
        out.set(PRIMARY_KEY, imdb_id);
        out.set_opt("title", row.title());
        out.set_opt("director", director_name);
        out.set_opt("director_gender", gender);
        out.set_opt("box_office", box_office);
        Ok(out)
    }
}
