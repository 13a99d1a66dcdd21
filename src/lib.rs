//! # Swarm Report Library
//!
//! The live reporting layer of a load-testing control plane. While a swarm of
//! simulated users hammers a target, this library turns the running
//! per-operation statistics into the payloads a dashboard polls and the CSV
//! files an operator downloads.
//!
//! ## Architecture Overview
//!
//! - `stats`: Per-operation statistics, exceptions and the `StatsSource` seam
//! - `runner`: Run phase, user count and the run clock
//! - `aggregator`: Total row, weighted median, truncation and sanitizing
//! - `cache`: Endpoint-keyed response cache with an adaptive TTL
//! - `export`: JSON payload types and the three CSV formats
//! - `service`: The object request handlers talk to
//! - `web`: HTTP routes on top of `service`
//! - `cli`, `logging`, `utils`: Binary plumbing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swarm_report::{InMemoryStats, ReportingConfig, ReportingService, RunState};
//!
//! # fn main() -> swarm_report::error::Result<()> {
//! let stats = Arc::new(InMemoryStats::new());
//! stats.set_state(RunState::Running);
//! stats.log_request("GET", "/", 42, 512)?;
//!
//! let service = ReportingService::new(stats, &ReportingConfig::default());
//! let payload = service.request_stats()?;
//! println!("{}", payload);
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency
//!
//! Every report is built from a single read of the statistics store, so the
//! Total row always describes the same data as the per-operation rows next
//! to it.

pub mod aggregator;

/// Command-line interface and configuration
///
/// Flags for the reporting server and the library-level `ReportingConfig`
/// they are converted into.
pub mod cli;

pub mod cache;
pub mod error;
pub mod export;

/// Log formatting and subscriber setup
pub mod logging;

pub mod runner;
pub mod service;
pub mod stats;
pub mod utils;

/// HTTP surface
///
/// An axum router exposing the polling endpoint, the CSV downloads, the
/// exception listing and the reset action.
pub mod web;

pub use aggregator::{AggregateReport, Aggregator, TotalMode};
pub use cache::{CachePolicy, ResponseCache};
pub use cli::{Args, ReportingConfig};
pub use runner::{RunMode, RunState, RunStatus, RunningType};
pub use service::ReportingService;
pub use stats::{InMemoryStats, StatEntry, StatsSource};

/// The current version of the reporting server
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// How long the polling payload is reused before it is rebuilt
    pub const CACHE_TIMEOUT: Duration = Duration::from_secs(2);

    /// Ceiling for adaptive cache timeout growth
    pub const MAX_CACHE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Operations and exceptions shown in the polling payload
    ///
    /// Dashboards render every row on each poll; past a few hundred rows
    /// the browser, not the server, becomes the bottleneck.
    pub const MAX_DISPLAY_ROWS: usize = 500;

    /// Percentile columns of the distribution CSV, in order
    pub const DISTRIBUTION_PERCENTILES: [f64; 9] =
        [50.0, 66.0, 75.0, 80.0, 90.0, 95.0, 98.0, 99.0, 100.0];

    /// Width of the sliding window behind `current_rps`, in seconds
    pub const CURRENT_RPS_WINDOW_SECS: u64 = 10;

    pub const WEB_HOST: &str = "127.0.0.1";
    pub const WEB_PORT: u16 = 8089;
}
