//! Error types for dataset handling, configuration and per-row enrichment.
//!
//! [`EnrichError`] is the per-row error: the pass loop inspects it to decide
//! whether a row was skipped, failed, or whether the whole pass should stop.
//! [`DatasetError`] and [`ConfigError`] are fatal and surface before (or
//! after) the row loop, never inside it.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single row produced no enrichment record.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Transport failure or a non-success status that is not a quota signal.
    #[error("network error: {0}")]
    Network(String),

    /// The source answered but had nothing for this key.
    #[error("not found: {0}")]
    NotFound(String),

    /// The source answered with a payload we could not use.
    #[error("parse error: {0}")]
    Parse(String),

    /// The source rejected the call because of rate or usage limits.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The row never reached the source (no lookup key, text too short, ...).
    #[error("skipped: {0}")]
    Skipped(String),

    /// Writing a downloaded artifact to disk failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnrichError {
    /// Skips are expected outcomes; everything else is a failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, EnrichError::NotFound(_) | EnrichError::Skipped(_))
    }

    /// Whether an external call was made before this error was produced.
    pub fn made_call(&self) -> bool {
        !matches!(self, EnrichError::Skipped(_))
    }

    /// Whether the source refused because of rate or usage limits.
    pub fn is_quota(&self) -> bool {
        matches!(self, EnrichError::QuotaExceeded(_))
    }
}

impl From<reqwest::Error> for EnrichError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            EnrichError::Parse(e.to_string())
        } else {
            EnrichError::Network(e.to_string())
        }
    }
}

impl From<url::ParseError> for EnrichError {
    fn from(e: url::ParseError) -> Self {
        EnrichError::Parse(format!("bad url: {e}"))
    }
}

/// Loading, joining, sampling or writing a tabular file failed.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed csv in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("key column `{key}` missing from {dataset}")]
    MissingKey { key: String, dataset: String },

    #[error("cannot sample {requested} rows from a dataset of {available}")]
    SampleTooLarge { requested: usize, available: usize },
}

/// Configuration could not be resolved at process start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("credential {0} is not set (flag or environment variable)")]
    MissingCredential(&'static str),
}
