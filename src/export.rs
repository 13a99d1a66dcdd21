//! # Report Export
//!
//! Renders an [`AggregateReport`] into the JSON polling payload or one of the
//! CSV downloads. Everything here is a pure transformation; framing for
//! download is limited to a file name and a content type.
//!
//! Field presence in the JSON payload is carried by `Option` fields:
//! `total_rps` and the total's `median_response_time` disappear while no
//! request has been recorded, and `slave_count` only exists for distributed
//! runs.

use crate::{
    aggregator::AggregateReport,
    defaults,
    error::Result,
    runner::{RunState, RunningType},
    stats::{ExceptionRecord, StatEntry},
    utils::{csv_escape, csv_quote},
};
use serde::Serialize;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// One row of the `stats` array
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRow {
    pub method: String,
    pub name: String,
    pub num_requests: u64,
    pub num_failures: u64,
    pub avg_response_time: f64,
    pub min_response_time: u64,
    pub max_response_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_response_time: Option<u64>,
    pub avg_content_length: f64,
    pub current_rps: f64,
    pub total_rps: f64,
}

impl From<&StatEntry> for StatRow {
    fn from(entry: &StatEntry) -> Self {
        Self {
            method: entry.method.clone(),
            name: entry.name.clone(),
            num_requests: entry.num_requests,
            num_failures: entry.num_failures,
            avg_response_time: entry.avg_response_time,
            min_response_time: entry.min_response_time.unwrap_or(0),
            max_response_time: entry.max_response_time,
            median_response_time: entry.median_response_time,
            avg_content_length: entry.avg_content_length,
            current_rps: entry.current_rps,
            total_rps: entry.total_rps,
        }
    }
}

/// Exception summary used by both the polling payload and `/exceptions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRow {
    pub count: u64,
    pub msg: String,
    pub traceback: String,
    pub nodes: String,
}

impl From<&ExceptionRecord> for ErrorRow {
    fn from(record: &ExceptionRecord) -> Self {
        Self {
            count: record.count,
            msg: record.msg.clone(),
            traceback: record.traceback.clone(),
            nodes: record.nodes_joined(),
        }
    }
}

/// Body of `GET /stats/requests`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestStatsPayload {
    pub stats: Vec<StatRow>,
    pub errors: Vec<ErrorRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rps: Option<f64>,
    pub fail_ratio: f64,
    /// Seconds
    pub total_run_time: f64,
    pub state: RunState,
    pub user_count: usize,
    pub running_type: RunningType,
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slave_count: Option<usize>,
}

impl From<&AggregateReport> for RequestStatsPayload {
    fn from(report: &AggregateReport) -> Self {
        Self {
            stats: report.rows().map(StatRow::from).collect(),
            errors: report.errors.iter().map(ErrorRow::from).collect(),
            total_rps: report.total_rps,
            fail_ratio: report.fail_ratio,
            total_run_time: report.total_run_time.as_secs_f64(),
            state: report.run_state,
            user_count: report.user_count,
            running_type: report.running_type,
            host: report.host.clone(),
            slave_count: report.slave_count,
        }
    }
}

/// Body of `GET /exceptions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionsPayload {
    pub exceptions: Vec<ErrorRow>,
}

/// Body returned when a request fails or for simple acknowledgements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub success: bool,
    pub message: String,
}

impl StatusPayload {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A rendered document ready to be served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub content_type: &'static str,
    pub body: String,
}

impl Download {
    /// Frame a CSV body as `<prefix>_<unix timestamp>.csv`
    pub fn csv(prefix: &str, body: String, timestamp: i64) -> Self {
        Self {
            file_name: format!("{}_{}.csv", prefix, timestamp),
            content_type: CSV_CONTENT_TYPE,
            body,
        }
    }

    /// Value for the `Content-Disposition` header
    pub fn disposition(&self) -> String {
        format!("attachment;filename={}", self.file_name)
    }
}

/// Serialize the polling payload
pub fn request_stats_json(report: &AggregateReport) -> Result<String> {
    Ok(serde_json::to_string(&RequestStatsPayload::from(report))?)
}

/// Serialize the exceptions listing
pub fn exceptions_json(records: &[ExceptionRecord]) -> Result<String> {
    let payload = ExceptionsPayload {
        exceptions: records.iter().map(ErrorRow::from).collect(),
    };
    Ok(serde_json::to_string(&payload)?)
}

const REQUESTS_HEADER: [&str; 10] = [
    "Method",
    "Name",
    "# requests",
    "# failures",
    "Median response time",
    "Average response time",
    "Min response time",
    "Max response time",
    "Average Content Size",
    "Requests/s",
];

/// Per-operation request statistics, total last
pub fn requests_csv(report: &AggregateReport) -> String {
    let mut rows = vec![quoted_header(&REQUESTS_HEADER)];

    for s in report.rows() {
        rows.push(format!(
            "{},{},{},{},{},{},{},{},{},{:.2}",
            csv_quote(&s.method),
            csv_quote(&s.name),
            s.num_requests,
            s.num_failures,
            s.median_response_time.unwrap_or(0),
            s.avg_response_time as u64,
            s.min_response_time.unwrap_or(0),
            s.max_response_time,
            s.avg_content_length as u64,
            s.total_rps,
        ));
    }

    rows.join("\n")
}

/// Response-time distribution per operation, total last
pub fn distribution_csv(report: &AggregateReport) -> String {
    let mut header = vec!["Name".to_string(), "# requests".to_string()];
    header.extend(
        defaults::DISTRIBUTION_PERCENTILES
            .iter()
            .map(|p| format!("{}%", p)),
    );
    let header: Vec<&str> = header.iter().map(String::as_str).collect();
    let mut rows = vec![quoted_header(&header)];

    for s in report.rows() {
        let mut cells = vec![csv_quote(&s.name), s.num_requests.to_string()];
        if s.num_requests == 0 {
            cells.extend(defaults::DISTRIBUTION_PERCENTILES.iter().map(|_| csv_quote("N/A")));
        } else {
            cells.extend(
                defaults::DISTRIBUTION_PERCENTILES
                    .iter()
                    .map(|&p| s.percentile(p).unwrap_or(0).to_string()),
            );
        }
        rows.push(cells.join(","));
    }

    rows.join("\n")
}

/// One row per exception; quoting only where a field needs it
pub fn exceptions_csv(records: &[ExceptionRecord]) -> String {
    let mut rows = vec!["Count,Message,Traceback,Nodes".to_string()];
    for record in records {
        rows.push(format!(
            "{},{},{},{}",
            record.count,
            csv_escape(&record.msg),
            csv_escape(&record.traceback),
            csv_escape(&record.nodes_joined()),
        ));
    }
    rows.join("\n")
}

fn quoted_header(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| csv_quote(c))
        .collect::<Vec<_>>()
        .join(",")
}
