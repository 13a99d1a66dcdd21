//! # StatEntry Store
//!
//! Per-operation request statistics as maintained by the load-generation
//! engine, plus the read contract the reporting layer consumes.
//!
//! ## Key Components
//!
//! - **RequestEntry**: mutable recorder for one `(method, name)` pair, backed
//!   by an HDR histogram of (rounded) response times
//! - **StatEntry**: immutable snapshot of a recorder, the unit every report
//!   is built from
//! - **ExceptionRecord**: an exception seen by one or more worker nodes
//! - **StatsSource**: read interface the aggregator works against
//! - **InMemoryStats**: in-process store the engine writes into
//!
//! ## Snapshot Consistency
//!
//! `InMemoryStats` guards everything with a single `parking_lot::RwLock`.
//! A snapshot of the entries, the total, the exceptions and the run status is
//! taken under one read guard, so the total always equals the sum of the
//! entries it was taken with even while workers keep logging requests.

use crate::{
    defaults,
    error::Result,
    runner::{RunClock, RunMode, RunState, RunStatus, RunningType},
    utils::{round_response_time, unix_timestamp_secs},
};
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the synthetic row summarizing all operations
pub const TOTAL_NAME: &str = "Total";

/// Percentile value pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ms: u64,
}

/// Point-in-time view of the statistics for one operation (or the total)
#[derive(Debug, Clone, PartialEq)]
pub struct StatEntry {
    pub method: String,
    pub name: String,
    pub num_requests: u64,
    pub num_failures: u64,
    /// `None` until the first sample is recorded
    pub min_response_time: Option<u64>,
    pub max_response_time: u64,
    pub avg_response_time: f64,
    /// `None` when there is no sample to take a median from
    pub median_response_time: Option<u64>,
    pub avg_content_length: f64,
    pub current_rps: f64,
    pub total_rps: f64,
    /// Latency at each of [`defaults::DISTRIBUTION_PERCENTILES`]; empty when
    /// the entry has no retained history
    pub percentiles: Vec<PercentileValue>,
}

impl StatEntry {
    /// An entry with no recorded requests
    pub fn empty(method: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            name: name.into(),
            num_requests: 0,
            num_failures: 0,
            min_response_time: None,
            max_response_time: 0,
            avg_response_time: 0.0,
            median_response_time: None,
            avg_content_length: 0.0,
            current_rps: 0.0,
            total_rps: 0.0,
            percentiles: Vec::new(),
        }
    }

    /// Fraction of requests that failed, 0 when nothing was requested
    pub fn fail_ratio(&self) -> f64 {
        if self.num_requests == 0 {
            0.0
        } else {
            self.num_failures as f64 / self.num_requests as f64
        }
    }

    /// Look up one of the retained distribution percentiles
    pub fn percentile(&self, percentile: f64) -> Option<u64> {
        self.percentiles
            .iter()
            .find(|p| (p.percentile - percentile).abs() < 1e-9)
            .map(|p| p.value_ms)
    }
}

/// Mutable statistics for one `(method, name)` pair
pub struct RequestEntry {
    method: String,
    name: String,
    num_requests: u64,
    num_failures: u64,
    total_response_time: u64,
    min_response_time: Option<u64>,
    max_response_time: u64,
    total_content_length: u64,
    response_times: Histogram<u64>,
    num_reqs_per_sec: BTreeMap<u64, u64>,
    start_time: f64,
    last_request_timestamp: f64,
}

impl RequestEntry {
    /// Create an empty recorder whose rate window starts at `start_time`
    pub fn new(method: impl Into<String>, name: impl Into<String>, start_time: f64) -> Result<Self> {
        Ok(Self {
            method: method.into(),
            name: name.into(),
            num_requests: 0,
            num_failures: 0,
            total_response_time: 0,
            min_response_time: None,
            max_response_time: 0,
            total_content_length: 0,
            // 3 significant figures, auto-resizing
            response_times: Histogram::<u64>::new(3)?,
            num_reqs_per_sec: BTreeMap::new(),
            start_time,
            last_request_timestamp: start_time,
        })
    }

    /// Record one completed request observed at `timestamp` (Unix seconds)
    pub fn log_at(&mut self, timestamp: f64, response_time_ms: u64, content_length: u64) -> Result<()> {
        self.num_requests += 1;
        self.total_response_time = self.total_response_time.saturating_add(response_time_ms);
        self.total_content_length = self.total_content_length.saturating_add(content_length);
        self.min_response_time = Some(
            self.min_response_time
                .map_or(response_time_ms, |min| min.min(response_time_ms)),
        );
        self.max_response_time = self.max_response_time.max(response_time_ms);
        self.response_times.record(round_response_time(response_time_ms))?;

        let second = timestamp.max(0.0) as u64;
        *self.num_reqs_per_sec.entry(second).or_insert(0) += 1;
        if timestamp > self.last_request_timestamp {
            self.last_request_timestamp = timestamp;
        }
        self.prune_rate_buckets();
        Ok(())
    }

    /// Count a failure against this operation
    pub fn log_error(&mut self) {
        self.num_failures += 1;
    }

    /// Fold another recorder into this one
    ///
    /// Counters, extremes, and per-second buckets are always merged; the
    /// latency history only when `include_history` is set, since merging
    /// histograms is the expensive part.
    pub fn merge(&mut self, other: &RequestEntry, include_history: bool) -> Result<()> {
        self.num_requests += other.num_requests;
        self.num_failures += other.num_failures;
        self.total_response_time = self
            .total_response_time
            .saturating_add(other.total_response_time);
        self.total_content_length = self
            .total_content_length
            .saturating_add(other.total_content_length);
        self.min_response_time = match (self.min_response_time, other.min_response_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max_response_time = self.max_response_time.max(other.max_response_time);
        self.start_time = self.start_time.min(other.start_time);
        self.last_request_timestamp = self.last_request_timestamp.max(other.last_request_timestamp);
        for (second, count) in &other.num_reqs_per_sec {
            *self.num_reqs_per_sec.entry(*second).or_insert(0) += count;
        }
        if include_history {
            self.response_times.add(&other.response_times)?;
        }
        Ok(())
    }

    /// Average requests per second over the rate window that ends two
    /// seconds before `now` (the trailing seconds may still be filling up)
    fn current_rps(&self, now: f64) -> f64 {
        let now = now.max(0.0) as u64;
        let window_start = now
            .saturating_sub(defaults::CURRENT_RPS_WINDOW_SECS + 2)
            .max(self.start_time.max(0.0) as u64);
        let window_end = now.saturating_sub(2);
        if window_end <= window_start {
            return 0.0;
        }

        let requests: u64 = self
            .num_reqs_per_sec
            .range(window_start..window_end)
            .map(|(_, count)| count)
            .sum();
        requests as f64 / (window_end - window_start) as f64
    }

    fn total_rps(&self) -> f64 {
        let span = self.last_request_timestamp - self.start_time;
        if span > 0.0 {
            self.num_requests as f64 / span
        } else {
            0.0
        }
    }

    /// Drop per-second buckets that can no longer fall inside the rate window
    fn prune_rate_buckets(&mut self) {
        let horizon = (self.last_request_timestamp.max(0.0) as u64)
            .saturating_sub(defaults::CURRENT_RPS_WINDOW_SECS * 2 + 2);
        while let Some((&oldest, _)) = self.num_reqs_per_sec.first_key_value() {
            if oldest >= horizon {
                break;
            }
            self.num_reqs_per_sec.remove(&oldest);
        }
    }

    /// Latency at `quantile`, as the lowest value of its histogram bucket
    /// and kept within the observed extremes
    ///
    /// Above 2048 ms a bucket spans several milliseconds; reporting its
    /// upper edge would place a single 12 000 ms sample at 12 007 ms.
    fn latency_at_quantile(&self, quantile: f64) -> u64 {
        let value = self
            .response_times
            .lowest_equivalent(self.response_times.value_at_quantile(quantile));
        let min = self.min_response_time.unwrap_or(0);
        value.clamp(min, self.max_response_time.max(min))
    }

    /// Take a read-only snapshot as of now
    ///
    /// With `with_history` unset the snapshot carries neither a median nor
    /// distribution percentiles, which is what the live total wants: its
    /// median is reconstructed by the aggregator instead.
    pub fn snapshot(&self, with_history: bool) -> StatEntry {
        self.snapshot_at(with_history, unix_timestamp_secs())
    }

    /// Take a read-only snapshot whose `current_rps` window ends at `now`
    /// (Unix seconds)
    pub fn snapshot_at(&self, with_history: bool, now: f64) -> StatEntry {
        let (avg_response_time, avg_content_length) = if self.num_requests > 0 {
            (
                self.total_response_time as f64 / self.num_requests as f64,
                self.total_content_length as f64 / self.num_requests as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let has_samples = with_history && !self.response_times.is_empty();
        let median_response_time = has_samples.then(|| self.latency_at_quantile(0.5));
        let percentiles = if has_samples {
            defaults::DISTRIBUTION_PERCENTILES
                .iter()
                .map(|&p| PercentileValue {
                    percentile: p,
                    value_ms: self.latency_at_quantile(p / 100.0),
                })
                .collect()
        } else {
            Vec::new()
        };

        StatEntry {
            method: self.method.clone(),
            name: self.name.clone(),
            num_requests: self.num_requests,
            num_failures: self.num_failures,
            min_response_time: self.min_response_time,
            max_response_time: self.max_response_time,
            avg_response_time,
            median_response_time,
            avg_content_length,
            current_rps: self.current_rps(now),
            total_rps: self.total_rps(),
            percentiles,
        }
    }
}

/// An exception raised inside simulated users, deduplicated across nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionRecord {
    pub count: u64,
    pub msg: String,
    pub traceback: String,
    /// Worker identifiers that observed it; ordered so joins are stable
    pub nodes: BTreeSet<String>,
}

impl ExceptionRecord {
    /// Nodes joined for display
    pub fn nodes_joined(&self) -> String {
        self.nodes.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    }
}

/// Everything a report reads, taken together under one consistent read
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    /// Sorted by `(method, name)`; never contains the total
    pub entries: Vec<StatEntry>,
    pub total: StatEntry,
    pub exceptions: Vec<ExceptionRecord>,
    pub status: RunStatus,
}

/// Read interface over the statistics owned by the load-generation engine
///
/// The reporting layer never mutates the store except through
/// [`StatsSource::reset_all`].
pub trait StatsSource: Send + Sync {
    /// Per-operation entries sorted by `(method, name)`
    fn list_entries(&self) -> Vec<StatEntry>;

    /// Synthetic total over every operation
    ///
    /// With `include_history` the total carries a median and distribution
    /// computed over the merged latency history of all operations.
    fn total_entry(&self, include_history: bool) -> Result<StatEntry>;

    /// Entries, total, exceptions and run status from a single read
    ///
    /// The default composes the individual accessors; stores that can
    /// should override it to take everything under one guard.
    fn snapshot(&self, include_history: bool) -> Result<StatsSnapshot> {
        Ok(StatsSnapshot {
            entries: self.list_entries(),
            total: self.total_entry(include_history)?,
            exceptions: self.exceptions(),
            status: self.run_status(),
        })
    }

    /// Current exception records, in no particular order
    fn exceptions(&self) -> Vec<ExceptionRecord>;

    fn run_status(&self) -> RunStatus;

    fn run_state(&self) -> RunState {
        self.run_status().state
    }

    /// Elapsed run time as of the last refresh
    fn run_time(&self) -> Duration;

    /// Bring the live run timer up to date
    fn refresh_run_time(&self);

    /// Clear every entry and exception
    fn reset_all(&self);
}

struct StatsInner {
    entries: BTreeMap<(String, String), RequestEntry>,
    /// Keyed by `(message, traceback)`
    exceptions: HashMap<(String, String), ExceptionRecord>,
    status: RunStatus,
    clock: RunClock,
    start_time: f64,
}

impl StatsInner {
    fn entry_mut(&mut self, method: &str, name: &str) -> Result<&mut RequestEntry> {
        match self.entries.entry((method.to_string(), name.to_string())) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                debug!("Tracking new operation {} {}", method, name);
                Ok(slot.insert(RequestEntry::new(method, name, self.start_time)?))
            }
        }
    }

    fn total(&self, include_history: bool, now: f64) -> Result<StatEntry> {
        let mut total = RequestEntry::new("", TOTAL_NAME, self.start_time)?;
        for entry in self.entries.values() {
            total.merge(entry, include_history)?;
        }
        Ok(total.snapshot_at(include_history, now))
    }

    fn snapshot_at(&self, include_history: bool, now: f64) -> Result<StatsSnapshot> {
        Ok(StatsSnapshot {
            entries: self
                .entries
                .values()
                .map(|e| e.snapshot_at(true, now))
                .collect(),
            total: self.total(include_history, now)?,
            exceptions: self.exceptions.values().cloned().collect(),
            status: self.status.clone(),
        })
    }
}

/// In-process statistics store written by the load engine
pub struct InMemoryStats {
    inner: RwLock<StatsInner>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StatsInner {
                entries: BTreeMap::new(),
                exceptions: HashMap::new(),
                status: RunStatus::default(),
                clock: RunClock::new(),
                start_time: unix_timestamp_secs(),
            }),
        }
    }

    /// Record a successful request
    pub fn log_request(
        &self,
        method: &str,
        name: &str,
        response_time_ms: u64,
        content_length: u64,
    ) -> Result<()> {
        self.log_request_at(unix_timestamp_secs(), method, name, response_time_ms, content_length)
    }

    pub fn log_request_at(
        &self,
        timestamp: f64,
        method: &str,
        name: &str,
        response_time_ms: u64,
        content_length: u64,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        inner
            .entry_mut(method, name)?
            .log_at(timestamp, response_time_ms, content_length)
    }

    /// Record a failed request; it counts as a request and as a failure
    pub fn log_failure(
        &self,
        method: &str,
        name: &str,
        response_time_ms: u64,
        error: &str,
    ) -> Result<()> {
        self.log_failure_at(unix_timestamp_secs(), method, name, response_time_ms, error)
    }

    pub fn log_failure_at(
        &self,
        timestamp: f64,
        method: &str,
        name: &str,
        response_time_ms: u64,
        error: &str,
    ) -> Result<()> {
        debug!("Request failure for {} {}: {}", method, name, error);
        let mut inner = self.inner.write();
        let entry = inner.entry_mut(method, name)?;
        entry.log_at(timestamp, response_time_ms, 0)?;
        entry.log_error();
        Ok(())
    }

    /// Record an exception raised on `node`
    pub fn log_exception(&self, msg: &str, traceback: &str, node: &str) {
        let key = (msg.to_string(), traceback.to_string());
        let mut inner = self.inner.write();
        let record = inner.exceptions.entry(key).or_insert_with(|| ExceptionRecord {
            count: 0,
            msg: msg.to_string(),
            traceback: traceback.to_string(),
            nodes: BTreeSet::new(),
        });
        record.count += 1;
        record.nodes.insert(node.to_string());
    }

    /// Move the run into a new phase, starting or freezing the run timer
    pub fn set_state(&self, state: RunState) {
        let mut inner = self.inner.write();
        let previous = inner.status.state;
        if previous == state {
            return;
        }
        if state.is_live() {
            inner.clock.start();
        } else {
            inner.clock.stop();
        }
        inner.status.state = state;
        info!("Run state changed: {} -> {}", previous, state);
    }

    pub fn set_user_count(&self, user_count: usize) {
        self.inner.write().status.user_count = user_count;
    }

    pub fn set_host(&self, host: Option<String>) {
        self.inner.write().status.host = host;
    }

    pub fn set_mode(&self, mode: RunMode) {
        self.inner.write().status.mode = mode;
    }

    pub fn set_running_type(&self, running_type: RunningType) {
        self.inner.write().status.running_type = running_type;
    }
}

impl Default for InMemoryStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSource for InMemoryStats {
    fn list_entries(&self) -> Vec<StatEntry> {
        let inner = self.inner.read();
        inner.entries.values().map(|e| e.snapshot(true)).collect()
    }

    fn total_entry(&self, include_history: bool) -> Result<StatEntry> {
        self.inner.read().total(include_history, unix_timestamp_secs())
    }

    fn snapshot(&self, include_history: bool) -> Result<StatsSnapshot> {
        self.inner
            .read()
            .snapshot_at(include_history, unix_timestamp_secs())
    }

    fn exceptions(&self) -> Vec<ExceptionRecord> {
        self.inner.read().exceptions.values().cloned().collect()
    }

    fn run_status(&self) -> RunStatus {
        self.inner.read().status.clone()
    }

    fn run_time(&self) -> Duration {
        self.inner.read().clock.elapsed()
    }

    fn refresh_run_time(&self) {
        self.inner.write().clock.refresh();
    }

    fn reset_all(&self) {
        let mut inner = self.inner.write();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.exceptions.clear();
        inner.clock.reset();
        inner.start_time = unix_timestamp_secs();
        if dropped > 0 {
            info!("Reset statistics for {} operations", dropped);
        } else {
            debug!("Reset requested with no recorded statistics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: f64 = 1_700_000_000.0;

    fn store_at(start: f64) -> InMemoryStats {
        let stats = InMemoryStats::new();
        stats.inner.write().start_time = start;
        stats
    }

    #[test]
    fn test_entry_counters_and_extremes() {
        let mut entry = RequestEntry::new("GET", "/", T0).unwrap();
        entry.log_at(T0 + 1.0, 30, 100).unwrap();
        entry.log_at(T0 + 1.0, 10, 300).unwrap();
        entry.log_at(T0 + 2.0, 20, 200).unwrap();
        entry.log_error();

        let snap = entry.snapshot(true);
        assert_eq!(snap.num_requests, 3);
        assert_eq!(snap.num_failures, 1);
        assert_eq!(snap.min_response_time, Some(10));
        assert_eq!(snap.max_response_time, 30);
        assert_eq!(snap.avg_response_time, 20.0);
        assert_eq!(snap.avg_content_length, 200.0);
        assert_eq!(snap.median_response_time, Some(20));
        assert_eq!(snap.percentile(100.0), Some(30));
        assert_eq!(snap.percentiles.len(), defaults::DISTRIBUTION_PERCENTILES.len());
    }

    #[test]
    fn test_empty_entry_has_no_min_or_median() {
        let entry = RequestEntry::new("GET", "/", T0).unwrap();
        let snap = entry.snapshot(true);
        assert_eq!(snap.min_response_time, None);
        assert_eq!(snap.median_response_time, None);
        assert!(snap.percentiles.is_empty());
        assert_eq!(snap.fail_ratio(), 0.0);
    }

    #[test]
    fn test_rates() {
        let mut entry = RequestEntry::new("GET", "/", T0).unwrap();
        for second in 0..20u64 {
            for _ in 0..4 {
                entry.log_at(T0 + second as f64, 5, 0).unwrap();
            }
        }
        let snap = entry.snapshot_at(false, T0 + 20.0);
        assert_eq!(snap.current_rps, 4.0);
        assert!((snap.total_rps - 80.0 / 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_current_rps_decays_after_traffic_stops() {
        let stats = store_at(T0);
        for second in 0..20u64 {
            for _ in 0..4 {
                stats
                    .log_request_at(T0 + second as f64, "GET", "/", 5, 0)
                    .unwrap();
            }
        }

        let busy = stats.inner.read().snapshot_at(false, T0 + 20.0).unwrap();
        assert_eq!(busy.entries[0].current_rps, 4.0);
        assert_eq!(busy.total.current_rps, 4.0);

        // Half the window idle
        let cooling = stats.inner.read().snapshot_at(false, T0 + 27.0).unwrap();
        assert_eq!(cooling.entries[0].current_rps, 2.0);

        let idle = stats.inner.read().snapshot_at(false, T0 + 100.0).unwrap();
        assert_eq!(idle.entries[0].current_rps, 0.0);
        assert_eq!(idle.total.current_rps, 0.0);
        assert!(idle.total.total_rps > 0.0);
    }

    #[test]
    fn test_slow_samples_stay_within_observed_extremes() {
        let stats = store_at(T0);
        stats.log_request_at(T0, "GET", "/report", 3400, 0).unwrap();
        stats.log_request_at(T0, "GET", "/export", 12_000, 0).unwrap();
        stats.log_request_at(T0, "GET", "/archive", 17_000, 0).unwrap();

        let snapshot = stats.inner.read().snapshot_at(true, T0).unwrap();
        for entry in snapshot.entries.iter().chain(std::iter::once(&snapshot.total)) {
            let median = entry.median_response_time.unwrap();
            assert!(median <= entry.max_response_time, "{} median {}", entry.name, median);
            for p in &entry.percentiles {
                assert!(p.value_ms <= entry.max_response_time, "{} {:?}", entry.name, p);
            }
        }

        let by_name = |name: &str| {
            snapshot
                .entries
                .iter()
                .find(|e| e.name == name)
                .cloned()
                .unwrap()
        };
        assert_eq!(by_name("/report").median_response_time, Some(3400));
        assert_eq!(by_name("/export").median_response_time, Some(12_000));
        assert_eq!(by_name("/export").percentile(100.0), Some(12_000));
        assert_eq!(by_name("/archive").median_response_time, Some(17_000));

        let total_max = snapshot.total.percentile(100.0).unwrap();
        assert!((16_984..=17_000).contains(&total_max), "p100 {}", total_max);
        assert_eq!(snapshot.total.median_response_time, Some(12_000));
    }

    #[test]
    fn test_total_sums_entries_and_is_sorted_last_free() {
        let stats = store_at(T0);
        stats.log_request_at(T0 + 1.0, "POST", "/login", 40, 10).unwrap();
        stats.log_request_at(T0 + 1.0, "GET", "/b", 10, 10).unwrap();
        stats.log_failure_at(T0 + 1.0, "GET", "/a", 20, "timeout").unwrap();

        let snapshot = stats.snapshot(false).unwrap();
        let keys: Vec<_> = snapshot
            .entries
            .iter()
            .map(|e| (e.method.as_str(), e.name.as_str()))
            .collect();
        assert_eq!(keys, vec![("GET", "/a"), ("GET", "/b"), ("POST", "/login")]);

        assert_eq!(snapshot.total.name, TOTAL_NAME);
        assert_eq!(snapshot.total.method, "");
        assert_eq!(snapshot.total.num_requests, 3);
        assert_eq!(snapshot.total.num_failures, 1);
        assert_eq!(snapshot.total.min_response_time, Some(10));
        assert_eq!(snapshot.total.median_response_time, None);
    }

    #[test]
    fn test_total_with_history_merges_histograms() {
        let stats = store_at(T0);
        stats.log_request_at(T0, "GET", "/a", 10, 0).unwrap();
        stats.log_request_at(T0, "GET", "/b", 20, 0).unwrap();
        stats.log_request_at(T0, "GET", "/b", 30, 0).unwrap();

        let total = stats.total_entry(true).unwrap();
        assert_eq!(total.median_response_time, Some(20));
        assert_eq!(total.percentile(100.0), Some(30));
    }

    #[test]
    fn test_snapshot_carries_exceptions_and_status() {
        let stats = store_at(T0);
        stats.set_state(RunState::Running);
        stats.set_user_count(7);
        stats.log_request_at(T0, "GET", "/", 10, 0).unwrap();
        stats.log_exception("boom", "tb", "local");

        let snapshot = stats.snapshot(false).unwrap();
        assert_eq!(snapshot.status.state, RunState::Running);
        assert_eq!(snapshot.status.user_count, 7);
        assert_eq!(snapshot.exceptions.len(), 1);
        assert_eq!(snapshot.total.num_requests, 1);
    }

    #[test]
    fn test_exceptions_differing_only_in_traceback_stay_apart() {
        let stats = InMemoryStats::new();
        stats.log_exception("boom", "line 1", "local");
        stats.log_exception("boom", "line 2", "local");
        stats.log_exception("boom", "line 1", "local");

        let mut records = stats.exceptions();
        records.sort_by(|a, b| a.traceback.cmp(&b.traceback));
        assert_eq!(records.len(), 2);
        assert_eq!((records[0].traceback.as_str(), records[0].count), ("line 1", 2));
        assert_eq!((records[1].traceback.as_str(), records[1].count), ("line 2", 1));
    }

    #[test]
    fn test_exceptions_deduplicate_by_message_and_traceback() {
        let stats = InMemoryStats::new();
        stats.log_exception("boom", "tb", "node-b");
        stats.log_exception("boom", "tb", "node-a");
        stats.log_exception("boom", "tb", "node-a");
        stats.log_exception("other", "tb", "node-a");

        let mut records = stats.exceptions();
        records.sort_by(|a, b| a.msg.cmp(&b.msg));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].count, 3);
        assert_eq!(records[0].nodes_joined(), "node-a, node-b");
    }

    #[test]
    fn test_state_transitions_drive_clock() {
        let stats = InMemoryStats::new();
        assert_eq!(stats.run_state(), RunState::Ready);
        stats.set_state(RunState::Hatching);
        assert!(stats.inner.read().clock.is_running());
        stats.set_state(RunState::Stopped);
        assert!(!stats.inner.read().clock.is_running());
    }

    #[test]
    fn test_reset_clears_entries_and_exceptions() {
        let stats = InMemoryStats::new();
        stats.log_request("GET", "/", 10, 10).unwrap();
        stats.log_exception("boom", "tb", "local");
        stats.reset_all();

        assert!(stats.list_entries().is_empty());
        assert!(stats.exceptions().is_empty());
        assert_eq!(stats.total_entry(true).unwrap().num_requests, 0);
    }
}
