//! Keyword-rule violence classifier.
//!
//! Fully local and deterministic: a baseline to compare the model-based
//! thematic coding against.

use crate::models::{Dataset, PRIMARY_KEY, Record, TITLE};
use std::fmt;

/// Keywords whose presence marks a text as violent.
pub const VIOLENCE_KEYWORDS: &[&str] = &[
    "kill", "murder", "violence", "gun", "fight", "blood", "terrorist", "attack", "riot", "war", "shoot", "bomb",
    "stab", "explosion", "rebel", "hostage", "brutal", "torture",
];

/// Column holding the [`ViolenceLevel`] label.
pub const OUTPUT_COLUMN: &str = "violence_representation";

/// Columns of `violence_measure.csv`.
pub const COLUMNS: &[&str] = &[PRIMARY_KEY, TITLE, OUTPUT_COLUMN];

const HIGH_AT: usize = 5;

/// How strongly a text represents violence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolenceLevel {
    High,
    Low,
    Unclear,
}

impl fmt::Display for ViolenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViolenceLevel::High => "High",
            ViolenceLevel::Low => "Low",
            ViolenceLevel::Unclear => "Unclear",
        })
    }
}

/// Number of `keywords` occurring in `text`, case-insensitively.
///
/// Each keyword counts once however often it appears, and matches inside
/// longer words ("war" in "toward").
pub fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    let text = text.to_lowercase();
    keywords
        .iter()
        .filter(|kw| text.contains(&kw.to_lowercase()))
        .count()
}

/// High at five or more hits, Low at one to four, otherwise Unclear.
/// Missing or blank text is Unclear.
pub fn classify(text: Option<&str>, keywords: &[&str]) -> ViolenceLevel {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return ViolenceLevel::Unclear;
    };
    match keyword_hits(text, keywords) {
        0 => ViolenceLevel::Unclear,
        n if n >= HIGH_AT => ViolenceLevel::High,
        _ => ViolenceLevel::Low,
    }
}

/// One output row per input row, labelled from `text_column`.
pub fn code_violence(texts: &Dataset, text_column: &str) -> Dataset {
    let rows = texts
        .rows
        .iter()
        .map(|row| {
            let level = classify(row.get(text_column), VIOLENCE_KEYWORDS);
            let mut out = row.project(&[PRIMARY_KEY, TITLE]);
            out.set(OUTPUT_COLUMN, level.to_string());
            out
        })
        .collect::<Vec<Record>>();
    Dataset::new(COLUMNS.iter().copied()).with_rows(rows)
}
