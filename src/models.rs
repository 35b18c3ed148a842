//! Tabular data model shared by every stage.
//!
//! - [`Record`]: one row, a mapping from column name to text value
//! - [`Dataset`]: an ordered list of records plus the declared column order
//!
//! All persisted data is CSV, so values are kept as text. An empty cell and an
//! absent column are the same thing: the value is null and [`Record::get`]
//! returns `None`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column that identifies a movie across every file.
pub const PRIMARY_KEY: &str = "imdb_id";

/// Column holding the human-readable title in the sample.
pub const TITLE: &str = "original_title";

/// A single row. Null values are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record(BTreeMap<String, String>);

impl Record {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(column, value)` pairs; empty values are dropped.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut record = Self::new();
        for (k, v) in pairs {
            record.set(k, v);
        }
        record
    }

    /// The value of `column`, or `None` when null.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    /// Set `column`; an empty (or whitespace-only) value clears it.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        if value.trim().is_empty() {
            self.0.remove(&column);
        } else {
            self.0.insert(column, value);
        }
    }

    /// Set `column` from an optional value; `None` clears it.
    ///
    /// # Arguments
    ///
    /// * `column` - Column name
    /// * `value` - New value; `None`, empty and whitespace-only all mean null
    pub fn set_opt(&mut self, column: impl Into<String>, value: Option<impl Into<String>>) {
        let column: String = column.into();
        match value {
            Some(v) => self.set(column, v),
            None => {
                self.0.remove(&column);
            }
        }
    }

    /// The primary key, if present.
    pub fn key(&self) -> Option<&str> {
        self.get(PRIMARY_KEY)
    }

    /// The sample title (`original_title`), if present.
    pub fn title(&self) -> Option<&str> {
        self.get(TITLE)
    }

    /// A short label for log lines: key, else title, else `"<unkeyed>"`.
    pub fn label(&self) -> String {
        self.key()
            .or_else(|| self.title())
            .unwrap_or("<unkeyed>")
            .to_string()
    }

    /// Names of the non-null columns, in sorted order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy every non-null value of `other` whose column is still null here.
    pub fn fill_from(&mut self, other: &Record) {
        for (k, v) in &other.0 {
            self.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    /// Keep only the named columns.
    pub fn project(&self, columns: &[&str]) -> Record {
        Record(
            self.0
                .iter()
                .filter(|(k, _)| columns.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// An ordered sequence of records sharing a column schema.
///
/// `columns` is the declared order used when writing; records may carry
/// values only for a subset of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Dataset {
    /// A dataset with the given declared columns and no rows.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Replace the rows, extending the declared columns with any new ones.
    pub fn with_rows(mut self, rows: Vec<Record>) -> Self {
        for row in &rows {
            self.absorb_columns(row);
        }
        self.rows = rows;
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether `column` is declared.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Append a column to the schema unless it is already declared.
    pub fn add_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    /// Append a row, extending the schema with any columns it introduces.
    pub fn push(&mut self, row: Record) {
        self.absorb_columns(&row);
        self.rows.push(row);
    }

    fn absorb_columns(&mut self, row: &Record) {
        let missing: Vec<String> = row
            .columns()
            .filter(|c| !self.has_column(c))
            .map(str::to_string)
            .collect();
        self.columns.extend(missing);
    }

    /// Keep only the named columns, in the given order.
    pub fn select(&self, columns: &[&str]) -> Dataset {
        Dataset {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: self.rows.iter().map(|r| r.project(columns)).collect(),
        }
    }

    /// Primary key of every row, in row order.
    pub fn keys(&self) -> Vec<Option<&str>> {
        self.rows.iter().map(Record::key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_null() {
        let mut r = Record::from_pairs([("imdb_id", "tt1"), ("plot", "")]);
        assert_eq!(r.key(), Some("tt1"));
        assert_eq!(r.get("plot"), None);

        r.set("plot", "A story");
        assert_eq!(r.get("plot"), Some("A story"));
        r.set("plot", "   ");
        assert_eq!(r.get("plot"), None);
    }

    #[test]
    fn test_label_falls_back_to_title() {
        let r = Record::from_pairs([("original_title", "Dangal")]);
        assert_eq!(r.label(), "Dangal");
        assert_eq!(Record::new().label(), "<unkeyed>");
    }

    #[test]
    fn test_fill_from_keeps_existing_values() {
        let mut left = Record::from_pairs([("imdb_id", "tt1"), ("original_title", "A")]);
        let right = Record::from_pairs([("original_title", "B"), ("plot", "p")]);
        left.fill_from(&right);
        assert_eq!(left.title(), Some("A"));
        assert_eq!(left.get("plot"), Some("p"));
    }

    #[test]
    fn test_push_extends_schema_in_order() {
        let mut d = Dataset::new(["imdb_id"]);
        d.push(Record::from_pairs([("imdb_id", "tt1"), ("zeta", "z")]));
        d.push(Record::from_pairs([("imdb_id", "tt2"), ("alpha", "a")]));
        assert_eq!(d.columns, vec!["imdb_id", "zeta", "alpha"]);
        assert_eq!(d.keys(), vec![Some("tt1"), Some("tt2")]);
    }

    #[test]
    fn test_select_projects_columns() {
        let d = Dataset::new(["imdb_id", "original_title", "year"]).with_rows(vec![
            Record::from_pairs([("imdb_id", "tt1"), ("original_title", "A"), ("year", "2011")]),
        ]);
        let s = d.select(&["imdb_id", "original_title"]);
        assert_eq!(s.columns, vec!["imdb_id", "original_title"]);
        assert_eq!(s.rows[0].get("year"), None);
        assert_eq!(s.rows[0].title(), Some("A"));
    }
}
