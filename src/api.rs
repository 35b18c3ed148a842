//! Generative model interaction.
//!
//! - [`AskAsync`]: the seam the thematic stage is written against
//! - [`AskFnWrapper`]: adapts `awful_aj::api::ask` (an OpenAI-compatible
//!   chat completion client) to that trait
//!
//! Calls are made exactly once. Pacing between calls is the pass loop's job
//! and there is no retry layer: a failed call fails the row.

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use std::error::Error;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors send text to a model and return its reply. Tests implement
/// it with canned replies.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// LLM configuration (API key, endpoint, model settings).
    pub config: &'a AwfulJadeConfig,
    /// Chat template holding the system prompt.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(reply) => debug!(elapsed_ms = dt.as_millis() as u128, reply_bytes = reply.len(), "API call succeeded"),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u128, error = %e, "API call failed"),
        }
        res
    }
}
