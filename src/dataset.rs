//! Dataset loading, joining and sampling.
//!
//! Loading is all-or-nothing: if any input cannot be read the whole load
//! fails, since sampling needs the complete universe of rows.
//!
//! Joins are equi-joins on a single key column. Where two inputs share a
//! non-key column the left value wins and the right one only fills nulls.

use crate::error::DatasetError;
use crate::models::{Dataset, Record};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

/// How rows without a partner on the other side are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Keep every left row, in left order; right-only keys are dropped.
    Left,
    /// Keep every left row, then append right-only keys in right order.
    Outer,
}

/// Parse CSV text into a [`Dataset`]. Empty cells become nulls.
pub fn parse_csv(bytes: &[u8], path: &Path) -> Result<Dataset, DatasetError> {
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
    let headers = reader.headers().map_err(csv_err)?.clone();
    let mut dataset = Dataset::new(headers.iter());

    for row in reader.records() {
        let row = row.map_err(csv_err)?;
        let record = Record::from_pairs(headers.iter().zip(row.iter()));
        dataset.rows.push(record);
    }
    Ok(dataset)
}

/// Read one CSV file.
#[instrument(level = "debug", fields(path = %path.display()))]
pub async fn load_csv(path: &Path) -> Result<Dataset, DatasetError> {
    let bytes = fs::read(path).await.map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let dataset = parse_csv(&bytes, path)?;
    debug!(rows = dataset.len(), columns = dataset.columns.len(), "Loaded CSV");
    Ok(dataset)
}

/// Read several CSV files; any failure aborts the whole load.
pub async fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Dataset>, DatasetError> {
    let mut out = Vec::with_capacity(paths.len());
    for p in paths {
        out.push(load_csv(p.as_ref()).await?);
    }
    Ok(out)
}

fn require_key(dataset: &Dataset, key: &str, name: &str) -> Result<(), DatasetError> {
    if dataset.has_column(key) {
        Ok(())
    } else {
        Err(DatasetError::MissingKey {
            key: key.to_string(),
            dataset: name.to_string(),
        })
    }
}

/// Join `right` onto `left` on `key`.
///
/// Each left row matches at most one right row (the first with that key), so
/// the result has exactly one row per left row. Rows with a null key never
/// match anything.
pub fn join(left: &Dataset, right: &Dataset, key: &str, kind: JoinKind) -> Result<Dataset, DatasetError> {
    require_key(left, key, "left input")?;
    require_key(right, key, "right input")?;

    let mut by_key: HashMap<&str, &Record> = HashMap::new();
    for row in &right.rows {
        if let Some(k) = row.get(key) {
            by_key.entry(k).or_insert(row);
        }
    }

    let mut out = Dataset::new(left.columns.iter().cloned());
    for column in &right.columns {
        out.add_column(column);
    }

    for row in &left.rows {
        let mut merged = row.clone();
        if let Some(partner) = row.get(key).and_then(|k| by_key.get(k)) {
            merged.fill_from(partner);
        }
        out.rows.push(merged);
    }

    if kind == JoinKind::Outer {
        let left_keys: std::collections::HashSet<&str> =
            left.rows.iter().filter_map(|r| r.get(key)).collect();
        let mut appended: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for row in &right.rows {
            match row.get(key) {
                Some(k) if left_keys.contains(k) => {}
                Some(k) => {
                    if appended.insert(k) {
                        out.rows.push(row.clone());
                    }
                }
                None => out.rows.push(row.clone()),
            }
        }
    }

    debug!(
        left = left.len(),
        right = right.len(),
        joined = out.len(),
        ?kind,
        "Joined datasets"
    );
    Ok(out)
}

/// Fold `join` over several datasets, left to right.
pub fn join_all(datasets: Vec<Dataset>, key: &str, kind: JoinKind) -> Result<Dataset, DatasetError> {
    let mut iter = datasets.into_iter();
    let Some(first) = iter.next() else {
        return Ok(Dataset::default());
    };
    require_key(&first, key, "input #1")?;
    iter.enumerate().try_fold(first, |acc, (i, next)| {
        require_key(&next, key, &format!("input #{}", i + 2))?;
        join(&acc, &next, key, kind)
    })
}

/// Draw `size` rows without replacement, reproducibly for a given `seed`.
///
/// The result order is the draw order, so the same input and seed always
/// yield the same rows in the same order.
#[instrument(level = "info", skip(dataset), fields(rows = dataset.len()))]
pub fn sample(dataset: &Dataset, size: usize, seed: u64) -> Result<Dataset, DatasetError> {
    if size > dataset.len() {
        return Err(DatasetError::SampleTooLarge {
            requested: size,
            available: dataset.len(),
        });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let picked = rand::seq::index::sample(&mut rng, dataset.len(), size);
    let rows = picked.into_iter().map(|i| dataset.rows[i].clone()).collect();
    info!(size, seed, "Sampled dataset");
    Ok(Dataset {
        columns: dataset.columns.clone(),
        rows,
    })
}

/// Add a `combined_text` column: subtitle text, a newline, then plot, with
/// missing parts treated as empty.
pub fn add_combined_text(dataset: &mut Dataset, first: &str, second: &str, target: &str) {
    for row in &mut dataset.rows {
        let combined = format!(
            "{}\n{}",
            row.get(first).unwrap_or(""),
            row.get(second).unwrap_or("")
        );
        row.set(target, combined);
    }
    dataset.add_column(target);
}
