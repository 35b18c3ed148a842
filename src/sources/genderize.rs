//! Name-based gender inference via genderize.io.
//!
//! Only consulted when TMDB has no gender for a director. The service keys
//! on given names, so only the first token of the name is sent.

use crate::error::EnrichError;
use crate::sources::check_status;
use serde::Deserialize;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct GenderizeResponse {
    gender: Option<String>,
    #[serde(default)]
    probability: Option<f64>,
}

/// Client for the genderize.io name → gender API.
#[derive(Debug, Clone)]
pub struct GenderizeClient {
    client: reqwest::Client,
    base_url: String,
}

impl GenderizeClient {
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `base_url` - Service root, e.g. `https://api.genderize.io/`
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    /// `Ok(None)` when the service has no answer for the name.
    #[instrument(level = "debug", skip(self))]
    pub async fn infer(&self, full_name: &str) -> Result<Option<String>, EnrichError> {
        let Some(first) = full_name.split_whitespace().next() else {
            return Ok(None);
        };
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("name", first)])
            .send()
            .await?;
        let body: GenderizeResponse = check_status(resp, "genderize")?
            .json()
            .await
            .map_err(|e| EnrichError::Parse(format!("genderize body: {e}")))?;
        debug!(name = first, gender = ?body.gender, probability = ?body.probability, "Genderize answer");
        Ok(body.gender.filter(|g| !g.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_infer_sends_first_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("name", "Meghna"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Meghna", "gender": "female", "probability": 0.98, "count": 120
            })))
            .mount(&server)
            .await;

        let client = GenderizeClient::new(reqwest::Client::new(), &server.uri());
        assert_eq!(client.infer("Meghna Gulzar").await.unwrap().as_deref(), Some("female"));
    }

    #[tokio::test]
    async fn test_infer_unknown_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Xq", "gender": null, "probability": 0.0, "count": 0
            })))
            .mount(&server)
            .await;

        let client = GenderizeClient::new(reqwest::Client::new(), &server.uri());
        assert_eq!(client.infer("Xq").await.unwrap(), None);
        assert_eq!(client.infer("   ").await.unwrap(), None);
    }
}
