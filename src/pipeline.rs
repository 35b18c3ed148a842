//! The shared row-enrichment skeleton.
//!
//! Every enrichment stage is an [`Enricher`]: given one input row it calls a
//! single external source and returns one output record, or an
//! [`EnrichError`]. [`run_pass`] drives an enricher over a dataset strictly
//! in order, one row at a time, pausing a fixed interval after each external
//! call via [`RateLimiter`]. A row's failure is logged and recorded in the
//! [`PassReport`]; it never stops the rows after it.

use crate::error::EnrichError;
use crate::models::{Dataset, Record};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// One external source that turns an input row into an enrichment record.
pub trait Enricher {
    /// Short source name used in logs and run summaries.
    fn source(&self) -> &'static str;

    /// Columns of the records this enricher produces, in output order.
    fn columns(&self) -> &'static [&'static str];

    /// Enrich a single row.
    async fn enrich(&self, row: &Record) -> Result<Record, EnrichError>;
}

/// Uniform pacing guard: a fixed pause after each external call.
///
/// No backoff, jitter or burst allowance.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    delay: Duration,
}

impl RateLimiter {
    /// Create a limiter that pauses `delay` after each call.
    ///
    /// A zero delay disables pacing.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// The configured pause.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the configured delay.
    ///
    /// Called by [`run_pass`] between rows; returns immediately when the
    /// delay is zero.
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

/// What happens when a source reports a quota rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotaPolicy {
    /// Record the failure and move on to the next row.
    #[default]
    Continue,
    /// Stop the pass; rows gathered so far are kept.
    Stop,
}

/// A skipped or failed row and the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowNote {
    pub row: usize,
    pub key: String,
    pub reason: String,
}

/// Outcome of one pass over a dataset.
#[derive(Debug, Default, Serialize)]
pub struct PassReport {
    pub source: String,
    pub rows_total: usize,
    pub rows_seen: usize,
    pub calls: usize,
    #[serde(skip)]
    pub records: Vec<Record>,
    pub enriched: usize,
    pub skipped: Vec<RowNote>,
    pub failed: Vec<RowNote>,
    pub stopped_on_quota: bool,
    pub elapsed_ms: u128,
}

/// Run `enricher` over every row of `dataset`, in order.
///
/// The pause follows every row that reached the source, except the last one
/// of the pass. Rows rejected before any call (see [`EnrichError::made_call`])
/// are not paced.
#[instrument(level = "info", skip_all, fields(source = enricher.source(), rows = dataset.len()))]
pub async fn run_pass<E: Enricher>(
    enricher: &E,
    dataset: &Dataset,
    limiter: RateLimiter,
    quota: QuotaPolicy,
) -> PassReport {
    let t0 = Instant::now();
    let mut report = PassReport {
        source: enricher.source().to_string(),
        rows_total: dataset.len(),
        ..PassReport::default()
    };
    let last = dataset.len().saturating_sub(1);

    for (i, row) in dataset.rows.iter().enumerate() {
        report.rows_seen += 1;
        let label = row.label();
        let result = enricher.enrich(row).await;

        let called = match &result {
            Ok(_) => true,
            Err(e) => e.made_call(),
        };
        if called {
            report.calls += 1;
        }

        match result {
            Ok(record) => {
                info!(row = i, key = %label, "Enriched row");
                report.records.push(record);
            }
            Err(e) if e.is_skip() => {
                warn!(row = i, key = %label, reason = %e, "Skipped row");
                report.skipped.push(RowNote {
                    row: i,
                    key: label,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                error!(row = i, key = %label, error = %e, "Row failed; continuing");
                let quota_hit = e.is_quota();
                report.failed.push(RowNote {
                    row: i,
                    key: label,
                    reason: e.to_string(),
                });
                if quota_hit && quota == QuotaPolicy::Stop {
                    warn!(row = i, remaining = last - i, "Quota exceeded; stopping pass");
                    report.stopped_on_quota = true;
                    break;
                }
            }
        }

        if called && i < last {
            limiter.pause().await;
        }
    }

    report.enriched = report.records.len();
    report.elapsed_ms = t0.elapsed().as_millis();
    info!(
        source = %report.source,
        enriched = report.enriched,
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        elapsed_ms = report.elapsed_ms,
        "Pass complete"
    );
    report
}
