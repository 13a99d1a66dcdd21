//! # Report Aggregation
//!
//! Builds an [`AggregateReport`] from one consistent read of a
//! [`StatsSource`]. The aggregator is a pure function of that read apart from
//! refreshing the live run timer.
//!
//! ## Global Median Without Raw Samples
//!
//! The live dashboard total does not merge every operation's latency history.
//! Instead each operation contributes its own median weighted by its request
//! count, and the weighted median of those pairs stands in for the global
//! median. It is an approximation, not a percentile of the underlying
//! samples, but it costs one map insert per operation.
//!
//! ## Display Bound
//!
//! Entry and exception lists are cut to `max_rows` after sorting. The total
//! is computed from the store before the cut and so always reflects every
//! operation.

use crate::{
    error::Result,
    runner::{RunState, RunningType},
    stats::{ExceptionRecord, StatEntry, StatsSource},
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Which flavour of total a report carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalMode {
    /// Counter-only total with a weighted-median reconstruction, for polling
    Live,
    /// Total whose median and percentiles come from the merged latency
    /// history of every operation, for one-shot exports
    FullHistory,
}

/// Everything a report endpoint renders, derived on demand
#[derive(Debug, Clone)]
pub struct AggregateReport {
    /// Sorted by `(method, name)` and truncated for display
    pub entries: Vec<StatEntry>,
    /// Synthetic total over every operation, never truncated
    pub total: StatEntry,
    /// Largest count first, truncated for display
    pub errors: Vec<ExceptionRecord>,
    /// `None` while no request has been recorded
    pub total_rps: Option<f64>,
    pub fail_ratio: f64,
    pub total_run_time: Duration,
    pub run_state: RunState,
    pub user_count: usize,
    pub running_type: RunningType,
    pub host: Option<String>,
    /// Only present for distributed runs
    pub slave_count: Option<usize>,
    /// Number of operations before truncation
    pub entry_count: usize,
}

impl AggregateReport {
    /// Entries followed by the total, in output order
    pub fn rows(&self) -> impl Iterator<Item = &StatEntry> {
        self.entries.iter().chain(std::iter::once(&self.total))
    }
}

/// Builds reports from a statistics source
#[derive(Debug, Clone)]
pub struct Aggregator {
    max_rows: usize,
}

impl Aggregator {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Produce a report from the current state of `source`
    pub fn aggregate(&self, source: &dyn StatsSource, mode: TotalMode) -> Result<AggregateReport> {
        let snapshot = source.snapshot(mode == TotalMode::FullHistory)?;
        let status = snapshot.status;

        let mut total = snapshot.total;
        let mut entries = snapshot.entries;
        let entry_count = entries.len();

        reconcile_total(&mut total, &entries);

        if mode == TotalMode::Live {
            total.median_response_time = weighted_median(
                entries
                    .iter()
                    .filter_map(|e| e.median_response_time.map(|m| (m, e.num_requests))),
            );
        }

        entries.sort_by(|a, b| (&a.method, &a.name).cmp(&(&b.method, &b.name)));
        entries.truncate(self.max_rows);
        for entry in entries.iter_mut() {
            sanitize(entry);
        }
        sanitize(&mut total);

        let mut errors = snapshot.exceptions;
        sort_exceptions(&mut errors);
        errors.truncate(self.max_rows);

        if status.state.is_live() {
            source.refresh_run_time();
        }
        let total_run_time = source.run_time();

        let has_data = total.num_requests > 0;
        let report = AggregateReport {
            total_rps: has_data.then_some(total.current_rps),
            fail_ratio: total.fail_ratio(),
            entries,
            total,
            errors,
            total_run_time,
            run_state: status.state,
            user_count: status.user_count,
            running_type: status.running_type,
            host: status.host,
            slave_count: status.mode.slave_count(),
            entry_count,
        };

        debug!(
            "Aggregated {} operations ({} displayed), {} exceptions",
            report.entry_count,
            report.entries.len(),
            report.errors.len()
        );
        Ok(report)
    }
}

/// Weighted median of `(value, weight)` pairs
///
/// Returns the smallest value whose cumulative weight reaches half of the
/// total weight. On an exact tie at the midpoint the lower of the two
/// straddling values wins. Pairs sharing a value are pooled first. `None`
/// when the total weight is zero.
pub fn weighted_median<I>(pairs: I) -> Option<u64>
where
    I: IntoIterator<Item = (u64, u64)>,
{
    let mut weights: BTreeMap<u64, u64> = BTreeMap::new();
    for (value, weight) in pairs {
        *weights.entry(value).or_insert(0) += weight;
    }

    let total: u64 = weights.values().sum();
    if total == 0 {
        return None;
    }

    let mut cumulative = 0u64;
    for (value, weight) in weights {
        cumulative += weight;
        if cumulative * 2 >= total {
            return Some(value);
        }
    }
    None
}

/// Order exceptions for display: most frequent first, then by message
pub fn sort_exceptions(errors: &mut [ExceptionRecord]) {
    errors.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.msg.cmp(&b.msg))
            .then_with(|| a.traceback.cmp(&b.traceback))
    });
}

/// Raise total counters that undercount their entries to the entry sums
fn reconcile_total(total: &mut StatEntry, entries: &[StatEntry]) {
    let requests: u64 = entries.iter().map(|e| e.num_requests).sum();
    let failures: u64 = entries.iter().map(|e| e.num_failures).sum();
    if total.num_requests < requests {
        warn!(
            "Total counts {} requests but operations count {}, using the sum",
            total.num_requests, requests
        );
        total.num_requests = requests;
    }
    if total.num_failures < failures {
        warn!(
            "Total counts {} failures but operations count {}, using the sum",
            total.num_failures, failures
        );
        total.num_failures = failures;
    }
}

/// Zero non-finite rates and averages so one bad entry cannot poison a report
fn sanitize(entry: &mut StatEntry) {
    let fields = [
        ("avg_response_time", &mut entry.avg_response_time),
        ("avg_content_length", &mut entry.avg_content_length),
        ("current_rps", &mut entry.current_rps),
        ("total_rps", &mut entry.total_rps),
    ];
    for (field, value) in fields {
        if !value.is_finite() || *value < 0.0 {
            warn!(
                "Dropping invalid {} ({}) for {} {}",
                field, value, entry.method, entry.name
            );
            *value = 0.0;
        }
    }
    if entry.num_failures > entry.num_requests {
        warn!(
            "Clamping failures ({}) to requests ({}) for {} {}",
            entry.num_failures, entry.num_requests, entry.method, entry.name
        );
        entry.num_failures = entry.num_requests;
    }
}
