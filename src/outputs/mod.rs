//! Output writers.
//!
//! - [`tabular`]: CSV datasets, including the dedup-on-merge writer every
//!   enrichment stage ends with
//! - [`json`]: per-run summaries under `runs/`

pub mod json;
pub mod tabular;
