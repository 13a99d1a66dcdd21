//! # Reporting Service
//!
//! The single object request handlers talk to. It owns the response cache
//! and the aggregator and holds a shared handle to the statistics source; it
//! is constructed once at startup and handed to the web layer as state.
//!
//! ## Request Flow
//!
//! ```text
//! request -> cache check -> (miss) aggregate -> export -> cache store -> response
//! ```
//!
//! Only the polling payload goes through the cache. CSV exports and the
//! exception listing are one-shot downloads and are always computed fresh.

use crate::{
    aggregator::{sort_exceptions, Aggregator, TotalMode},
    cache::{CachePolicy, ResponseCache},
    cli::ReportingConfig,
    error::Result,
    export::{self, Download},
    stats::StatsSource,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Cached endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    RequestStats,
}

/// Builds every report exposed over HTTP
pub struct ReportingService {
    source: Arc<dyn StatsSource>,
    aggregator: Aggregator,
    cache: ResponseCache<Endpoint, Arc<str>>,
}

impl ReportingService {
    pub fn new(source: Arc<dyn StatsSource>, config: &ReportingConfig) -> Self {
        Self {
            source,
            aggregator: Aggregator::new(config.max_rows),
            cache: ResponseCache::new(CachePolicy {
                base_ttl: config.cache_timeout,
                adaptive: config.adaptive_cache,
                max_ttl: config.max_cache_timeout,
            }),
        }
    }

    pub fn source(&self) -> &Arc<dyn StatsSource> {
        &self.source
    }

    pub fn cache(&self) -> &ResponseCache<Endpoint, Arc<str>> {
        &self.cache
    }

    /// JSON polling payload, served from cache while fresh
    pub fn request_stats(&self) -> Result<Arc<str>> {
        let phase = self.source.run_state();
        self.cache
            .get_or_compute(Endpoint::RequestStats, phase, || {
                let report = self.aggregator.aggregate(self.source.as_ref(), TotalMode::Live)?;
                let json = export::request_stats_json(&report)?;
                debug!("Rendered request stats payload ({} bytes)", json.len());
                Ok(Arc::from(json))
            })
    }

    /// Requests CSV over the full latency history
    pub fn requests_csv(&self) -> Result<Download> {
        let report = self
            .aggregator
            .aggregate(self.source.as_ref(), TotalMode::FullHistory)?;
        Ok(Download::csv(
            "requests",
            export::requests_csv(&report),
            export_timestamp(),
        ))
    }

    /// Distribution CSV over the full latency history
    pub fn distribution_csv(&self) -> Result<Download> {
        let report = self
            .aggregator
            .aggregate(self.source.as_ref(), TotalMode::FullHistory)?;
        Ok(Download::csv(
            "distribution",
            export::distribution_csv(&report),
            export_timestamp(),
        ))
    }

    /// Every exception as JSON, untruncated
    pub fn exceptions(&self) -> Result<String> {
        let mut records = self.source.exceptions();
        sort_exceptions(&mut records);
        export::exceptions_json(&records)
    }

    /// Every exception as CSV, untruncated
    pub fn exceptions_csv(&self) -> Result<Download> {
        let mut records = self.source.exceptions();
        sort_exceptions(&mut records);
        Ok(Download::csv(
            "exceptions",
            export::exceptions_csv(&records),
            export_timestamp(),
        ))
    }

    /// Clear the stores and every cached payload
    pub fn reset(&self) {
        self.source.reset_all();
        self.cache.invalidate_all();
        info!("Statistics and report cache reset");
    }
}

fn export_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
