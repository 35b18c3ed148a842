//! Reshape thematic coding output into one row per (movie, theme).
//!
//! Labels come from the label columns when present, otherwise from the
//! `raw` reply. Title and release year are attached from the sample. Rows
//! whose theme has no usable label are dropped and counted.

use crate::models::{Dataset, PRIMARY_KEY, Record, TITLE};
use crate::sources::thematic::{RAW, Theme, ThemeReply, parse_reply};
use std::collections::HashMap;

/// Sample column carrying the release year.
pub const YEAR_OF_RELEASE: &str = "year_of_release";

/// Columns of `thematic_coding_clean.csv`.
pub const COLUMNS: &[&str] = &[PRIMARY_KEY, TITLE, "year", "theme", "sentiment_category"];

/// Result of [`reshape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reshaped {
    pub dataset: Dataset,
    /// (movie, theme) pairs with no category.
    pub dropped: usize,
}

/// Label for `theme` from its column, falling back to `raw` decoded labels.
fn label_for(row: &Record, theme: Theme, from_raw: &[(Theme, &'static str)]) -> Option<&'static str> {
    row.get(theme.key())
        .and_then(|value| theme.normalize(value))
        .or_else(|| from_raw.iter().find(|(t, _)| *t == theme).map(|(_, label)| *label))
}

fn raw_labels(row: &Record) -> Vec<(Theme, &'static str)> {
    match row.get(RAW).map(parse_reply) {
        Some(ThemeReply::Coded(labels)) | Some(ThemeReply::Partial { labels, .. }) => labels,
        _ => Vec::new(),
    }
}

/// Long-format thematic table, theme-major like a melt over the four themes.
pub fn reshape(thematic: &Dataset, sample: &Dataset) -> Reshaped {
    let mut by_key: HashMap<&str, &Record> = HashMap::new();
    for row in &sample.rows {
        if let Some(key) = row.key() {
            by_key.entry(key).or_insert(row);
        }
    }

    let decoded: Vec<Vec<(Theme, &'static str)>> = thematic.rows.iter().map(raw_labels).collect();

    let mut dataset = Dataset::new(COLUMNS.iter().copied());
    let mut dropped = 0;
    for theme in Theme::ALL {
        for (row, from_raw) in thematic.rows.iter().zip(&decoded) {
            let Some(label) = label_for(row, theme, from_raw) else {
                dropped += 1;
                continue;
            };
            let movie = row.key().and_then(|k| by_key.get(k));

            let mut out = Record::new();
            out.set_opt(PRIMARY_KEY, row.key());
            out.set_opt(TITLE, movie.and_then(|m| m.title()).or(row.title()));
            out.set_opt("year", movie.and_then(|m| m.get(YEAR_OF_RELEASE)));
            out.set("theme", theme.key());
            out.set("sentiment_category", label);
            dataset.push(out);
        }
    }
    Reshaped { dataset, dropped }
}
