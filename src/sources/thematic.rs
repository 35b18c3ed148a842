//! Thematic coding of combined subtitle + plot text by a generative model.
//!
//! Each row's `combined_text` is cut to a character budget and wrapped in a
//! fixed instruction asking for four labels. The reply is untrusted text:
//! it is decoded as a JSON5 object when it looks like one (after removing a
//! code fence) and every label is checked against its theme's label set.
//! Anything that does not fully validate keeps the reply verbatim in `raw`
//! so a later cleaning pass can recover it. Key and title stay attached
//! either way.

use crate::api::AskAsync;
use crate::error::EnrichError;
use crate::models::{PRIMARY_KEY, Record, TITLE};
use crate::pipeline::Enricher;
use crate::utils::{strip_code_fence, truncate_chars, truncate_for_log};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Column the stage reads its input text from.
pub const COMBINED_TEXT: &str = "combined_text";

/// Column holding an unvalidated model reply.
pub const RAW: &str = "raw";

/// Columns of `thematic_coding.csv`.
pub const COLUMNS: &[&str] = &[PRIMARY_KEY, TITLE, "hindu_muslim", "gender", "nationalism", "caste", RAW];

/// The four coding axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    HinduMuslim,
    Gender,
    Nationalism,
    Caste,
}

impl Theme {
    /// Every theme, in prompt and output order.
    pub const ALL: [Theme; 4] = [Theme::HinduMuslim, Theme::Gender, Theme::Nationalism, Theme::Caste];

    /// Reply key and output column.
    pub fn key(self) -> &'static str {
        match self {
            Theme::HinduMuslim => "hindu_muslim",
            Theme::Gender => "gender",
            Theme::Nationalism => "nationalism",
            Theme::Caste => "caste",
        }
    }

    /// Heading used for the theme in the prompt.
    pub fn title(self) -> &'static str {
        match self {
            Theme::HinduMuslim => "Hindu–Muslim relations",
            Theme::Gender => "Gender relations",
            Theme::Nationalism => "Nationalism",
            Theme::Caste => "Attitude towards caste hierarchy",
        }
    }

    /// The permitted labels, in canonical spelling.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Theme::HinduMuslim => &["Exclusionary", "Inclusive", "Neutral"],
            Theme::Gender => &["Progressive", "Conservative", "Neutral"],
            Theme::Nationalism => &["Positive", "Negative", "Neutral"],
            Theme::Caste => &["Reinforcing", "Challenging", "Neutral"],
        }
    }

    /// The canonical label matching `value`, ignoring case and whitespace.
    pub fn normalize(self, value: &str) -> Option<&'static str> {
        let value = value.trim();
        self.labels()
            .iter()
            .copied()
            .find(|label| label.eq_ignore_ascii_case(value))
    }
}

/// The fixed instruction wrapped around every text.
pub fn make_prompt(text: &str) -> String {
    let mut themes = String::new();
    for (i, theme) in Theme::ALL.iter().enumerate() {
        themes.push_str(&format!("{}. {}: {}\n", i + 1, theme.title(), theme.labels().join(", ")));
    }
    let keys = Theme::ALL.map(Theme::key).join(", ");
    format!(
        "Analyze the following movie content (subtitle + description) and code it for the following themes:\n\n\
         {themes}\n\
         Respond in JSON with keys: {keys}\n\n\
         TEXT:\n{text}\n"
    )
}

/// A model reply after safe decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeReply {
    /// Every theme present with a permitted label.
    Coded(Vec<(Theme, &'static str)>),
    /// Decoded as an object but some themes are missing or off-list; the
    /// valid ones are kept alongside the raw text.
    Partial {
        labels: Vec<(Theme, &'static str)>,
        raw: String,
    },
    /// Not an object at all.
    Raw(String),
}

/// Decode a reply without ever evaluating it.
///
/// The object is read as JSON5, which also accepts the single-quoted dicts
/// models often emit (`{'gender': 'Neutral'}`).
///
/// # Returns
///
/// [`ThemeReply::Coded`] when all four themes validate, [`ThemeReply::Partial`]
/// when the object decodes but some are missing or off-list, otherwise
/// [`ThemeReply::Raw`].
pub fn parse_reply(reply: &str) -> ThemeReply {
    let cleaned = strip_code_fence(reply);
    if !cleaned.starts_with('{') {
        return ThemeReply::Raw(reply.trim().to_string());
    }
    let Ok(object) = json5::from_str::<Map<String, Value>>(cleaned) else {
        return ThemeReply::Raw(reply.trim().to_string());
    };

    let labels = labels_from_object(&object);
    if labels.len() == Theme::ALL.len() {
        ThemeReply::Coded(labels)
    } else {
        ThemeReply::Partial {
            labels,
            raw: reply.trim().to_string(),
        }
    }
}

/// Permitted labels found in a decoded object, in theme order.
pub fn labels_from_object(object: &Map<String, Value>) -> Vec<(Theme, &'static str)> {
    Theme::ALL
        .iter()
        .filter_map(|&theme| {
            let value = object.get(theme.key())?.as_str()?;
            theme.normalize(value).map(|label| (theme, label))
        })
        .collect()
}

/// Classifies rows through any [`AskAsync`] model.
#[derive(Debug)]
pub struct ThematicSource<A> {
    model: A,
    min_chars: usize,
    max_chars: usize,
}

impl<A> ThematicSource<A>
where
    A: AskAsync<Response = String>,
{
    /// # Arguments
    ///
    /// * `model` - Any [`AskAsync`] implementation returning the reply text
    /// * `min_chars` - Shorter combined text is skipped without a call
    /// * `max_chars` - Combined text is cut to this many characters
    pub fn new(model: A, min_chars: usize, max_chars: usize) -> Self {
        Self {
            model,
            min_chars,
            max_chars,
        }
    }
}

impl<A> Enricher for ThematicSource<A>
where
    A: AskAsync<Response = String>,
{
    fn source(&self) -> &'static str {
        "thematic_llm"
    }

    fn columns(&self) -> &'static [&'static str] {
        COLUMNS
    }

    async fn enrich(&self, row: &Record) -> Result<Record, EnrichError> {
        let text = row.get(COMBINED_TEXT).unwrap_or("");
        let length = text.trim().chars().count();
        if length < self.min_chars {
            return Err(EnrichError::Skipped(format!(
                "combined text too short ({length} < {} chars)",
                self.min_chars
            )));
        }

        let prompt = make_prompt(truncate_chars(text, self.max_chars));
        let reply = self
            .model
            .ask(&prompt)
            .await
            .map_err(|e| EnrichError::Network(format!("model call failed: {e}")))?;
        debug!(reply = %truncate_for_log(&reply, 300), "Model reply");

        let mut out = Record::new();
        out.set_opt(PRIMARY_KEY, row.key());
        out.set_opt(TITLE, row.title());
        match parse_reply(&reply) {
            ThemeReply::Coded(labels) => {
                for (theme, label) in labels {
                    out.set(theme.key(), label);
                }
            }
            ThemeReply::Partial { labels, raw } => {
                warn!(key = %row.label(), found = labels.len(), "Reply missing or off-list labels; keeping raw text");
                for (theme, label) in labels {
                    out.set(theme.key(), label);
                }
                out.set(RAW, raw);
            }
            ThemeReply::Raw(raw) => {
                warn!(key = %row.label(), reply = %truncate_for_log(&raw, 120), "Reply is not structured; keeping raw text");
                out.set(RAW, raw);
            }
        }
        Ok(out)
    }
}
