//! JSON run summaries.
//!
//! Each stage leaves one summary per run so skipped and failed keys can be
//! reviewed after the console output is gone:
//!
//! ```text
//! data/runs/
//! ├── plots_2025-05-06T14-03-11.json
//! └── thematic_2025-05-06T15-20-45.json
//! ```

use chrono::{DateTime, Local};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Envelope written for every stage.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a, T: Serialize> {
    pub stage: &'a str,
    pub started_at: String,
    pub finished_at: String,
    #[serde(flatten)]
    pub details: &'a T,
}

/// `{runs_dir}/{stage}_{timestamp}.json`, with a filename-safe timestamp.
pub fn summary_path(runs_dir: &Path, stage: &str, at: DateTime<Local>) -> PathBuf {
    runs_dir.join(format!("{stage}_{}.json", at.format("%Y-%m-%dT%H-%M-%S")))
}

/// Write a summary of `details` for `stage` and return its path.
#[instrument(level = "info", skip_all, fields(stage = %stage, runs_dir = %runs_dir.display()))]
pub async fn write_run_summary<T: Serialize>(
    runs_dir: &Path,
    stage: &str,
    started_at: DateTime<Local>,
    details: &T,
) -> Result<PathBuf, Box<dyn Error>> {
    let finished_at = Local::now();
    let summary = RunSummary {
        stage,
        started_at: started_at.to_rfc3339(),
        finished_at: finished_at.to_rfc3339(),
        details,
    };
    let json = serde_json::to_string_pretty(&summary)?;

    if let Err(e) = fs::create_dir_all(runs_dir).await {
        error!(error = %e, "Failed to create runs dir");
        return Err(e.into());
    }

    let path = summary_path(runs_dir, stage, started_at);
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run summary");
    Ok(path)
}
