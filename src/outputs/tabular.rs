//! CSV output with dedup-on-merge.
//!
//! [`write_merged`] is the only point where a new run meets earlier runs:
//! existing rows are loaded, new rows appended, and one row per key is kept
//! with the newest winning. Rows without a key are matched on their title;
//! rows with neither are never collapsed.
//!
//! Files are written to a sibling temp file and renamed into place.

use crate::dataset::load_csv;
use crate::error::DatasetError;
use crate::models::{Dataset, Record, TITLE};
use itertools::Itertools;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Row counts for one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub existing: usize,
    pub incoming: usize,
    pub written: usize,
}

/// Identity of a row when merging: the key, else the title, else its position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowIdentity {
    Key(String),
    Title(String),
    Position(usize),
}

impl RowIdentity {
    fn of(row: &Record, key: &str, position: usize) -> Self {
        match (row.get(key), row.get(TITLE)) {
            (Some(k), _) => RowIdentity::Key(k.to_owned()),
            (None, Some(title)) => RowIdentity::Title(title.to_owned()),
            (None, None) => RowIdentity::Position(position),
        }
    }
}

/// Keep the last row for each key, in the relative order of those last rows.
///
/// Rows without `key` are matched on the title column instead, the same
/// fallback the enrichers use for lookups. Rows with neither are all kept.
///
/// # Arguments
///
/// * `rows` - Existing rows followed by incoming rows
/// * `key` - The primary key column
pub fn dedup_keep_last(rows: Vec<Record>, key: &str) -> Vec<Record> {
    let mut kept: Vec<Record> = rows
        .into_iter()
        .enumerate()
        .rev()
        .unique_by(|(i, row)| RowIdentity::of(row, key, *i))
        .map(|(_, row)| row)
        .collect();
    kept.reverse();
    kept
}

/// Declared columns first, then any extra columns seen in `extra`.
fn output_columns(declared: &[&str], extra: &[String]) -> Vec<String> {
    declared
        .iter()
        .map(|c| c.to_string())
        .chain(extra.iter().cloned())
        .unique()
        .collect()
}

/// Serialize rows under `columns`; nulls become empty cells.
pub fn to_csv_bytes(columns: &[String], rows: &[Record], path: &Path) -> Result<Vec<u8>, DatasetError> {
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(columns).map_err(csv_err)?;
    for row in rows {
        writer
            .write_record(columns.iter().map(|c| row.get(c).unwrap_or("")))
            .map_err(csv_err)?;
    }
    writer.into_inner().map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e.into_error(),
    })
}

async fn write_atomically(path: &Path, bytes: Vec<u8>) -> Result<(), DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut tmp = PathBuf::from(path);
    tmp.as_mut_os_string().push(".tmp");
    fs::write(&tmp, bytes).await.map_err(io_err)?;
    fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

/// Write `dataset` to `path`, replacing whatever is there.
#[instrument(level = "info", skip_all, fields(path = %path.display(), rows = dataset.len()))]
pub async fn write_dataset(path: &Path, dataset: &Dataset, columns: &[&str]) -> Result<(), DatasetError> {
    let columns = output_columns(columns, &dataset.columns);
    let bytes = to_csv_bytes(&columns, &dataset.rows, path)?;
    write_atomically(path, bytes).await?;
    info!("Wrote CSV");
    Ok(())
}

/// Merge `incoming` into the file at `path`, deduplicating by `key`.
///
/// If the file exists its rows come first, so an incoming row replaces an
/// existing row with the same key. The written header always contains every
/// `columns` entry even when no row has a value for it.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_merged(
    path: &Path,
    incoming: Vec<Record>,
    key: &str,
    columns: &[&str],
) -> Result<MergeReport, DatasetError> {
    let existing = if fs::try_exists(path).await.unwrap_or(false) {
        load_csv(path).await?
    } else {
        Dataset::default()
    };

    let existing_count = existing.len();
    let incoming_count = incoming.len();
    let mut schema = Dataset::new(output_columns(columns, &existing.columns));

    let mut all = existing.rows;
    all.extend(incoming);
    let rows = dedup_keep_last(all, key);
    for row in &rows {
        for c in row.columns() {
            schema.add_column(c);
        }
    }

    let bytes = to_csv_bytes(&schema.columns, &rows, path)?;
    write_atomically(path, bytes).await?;

    let report = MergeReport {
        existing: existing_count,
        incoming: incoming_count,
        written: rows.len(),
    };
    info!(
        existing = report.existing,
        incoming = report.incoming,
        written = report.written,
        "Merged CSV"
    );
    Ok(report)
}
