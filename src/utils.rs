//! # Utility Functions and Helper Module
//!
//! Small helpers shared by the store, the exporter, and the binary:
//! timestamps, response-time rounding, CSV field quoting, and human-readable
//! duration formatting for log output.
//!
//! ## Usage Examples
//!
//! ```rust
//! use swarm_report::utils::*;
//! use std::time::Duration;
//!
//! assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
//! assert_eq!(csv_quote("GET"), "\"GET\"");
//! assert_eq!(round_response_time(1234), 1200);
//! ```

use anyhow::{anyhow, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get the current time as fractional seconds since the Unix epoch
///
/// Request timestamps are kept in this form so per-second request buckets
/// can be derived by truncation.
///
/// ## Error Handling
///
/// If the system time is before the Unix epoch (very rare), returns 0.0
/// to provide a safe fallback rather than panicking.
pub fn unix_timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Round a response time before it is added to an entry's retained history
///
/// Keeps the histogram compact while preserving the precision that matters
/// on a dashboard:
///
/// - below 100 ms the value is kept as is
/// - below 1 000 ms it is rounded to the nearest 10 ms
/// - below 10 000 ms it is rounded to the nearest 100 ms
/// - anything longer is rounded to the nearest second
///
/// ## Examples
///
/// ```rust
/// # use swarm_report::utils::round_response_time;
/// assert_eq!(round_response_time(47), 47);
/// assert_eq!(round_response_time(147), 150);
/// assert_eq!(round_response_time(3432), 3400);
/// assert_eq!(round_response_time(58760), 59000);
/// ```
pub fn round_response_time(response_time_ms: u64) -> u64 {
    if response_time_ms < 100 {
        return response_time_ms;
    }
    let step = if response_time_ms < 1_000 {
        10
    } else if response_time_ms < 10_000 {
        100
    } else {
        1_000
    };
    ((response_time_ms + step / 2) / step) * step
}

/// Wrap a CSV field in double quotes, doubling any embedded quotes
pub fn csv_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Quote a CSV field only when it contains a delimiter, quote, or line break
pub fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        csv_quote(value)
    } else {
        value.to_string()
    }
}

/// Format a duration in a human-readable way
///
/// Converts a Duration to a human-readable string, automatically selecting
/// the most appropriate unit based on the magnitude.
///
/// ## Unit Selection Logic
///
/// - **Microseconds**: < 1 ms (e.g., "250μs")
/// - **Milliseconds**: < 1 s (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: For longer durations (e.g., "5m 30s", "2h 15m 30s")
///
/// ## Examples
///
/// ```rust
/// # use swarm_report::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_micros(250)), "250μs");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_us = duration.as_micros();

    if total_us < 1_000 {
        format!("{}μs", total_us)
    } else if total_us < 1_000_000 {
        format!("{:.2}ms", total_us as f64 / 1_000.0)
    } else if total_us < 60_000_000 {
        format!("{:.2}s", total_us as f64 / 1_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Parse duration from string (e.g., "2s", "500ms", "1m")
///
/// A bare number is interpreted as seconds. Fractional values are accepted
/// for every unit, so "0.5" and "500ms" are equivalent.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, scale) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, 0.001)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1.0)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60.0)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 3600.0)
    } else {
        (s, 1.0)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    Ok(Duration::from_secs_f64(num * scale))
}

/// Validate the port the reporting server listens on
///
/// Port 0 asks the OS for an ephemeral port, which makes the dashboard URL
/// unpredictable, so it is rejected for the web server.
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(anyhow!("Port cannot be 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_response_time() {
        assert_eq!(round_response_time(0), 0);
        assert_eq!(round_response_time(99), 99);
        assert_eq!(round_response_time(104), 100);
        assert_eq!(round_response_time(105), 110);
        assert_eq!(round_response_time(999), 1000);
        assert_eq!(round_response_time(1049), 1000);
        assert_eq!(round_response_time(12_500), 13_000);
    }

    #[test]
    fn test_csv_quote_doubles_embedded_quotes() {
        assert_eq!(csv_quote("/search?q=\"x\""), "\"/search?q=\"\"x\"\"\"");
        assert_eq!(csv_quote(""), "\"\"");
    }

    #[test]
    fn test_csv_escape_only_when_needed() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("0.5").unwrap(), Duration::from_millis(500));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_micros(10)), "10μs");
        assert_eq!(format_duration(Duration::from_millis(2)), "2.00ms");
        assert_eq!(format_duration(Duration::from_secs(2)), "2.00s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port(8089).is_ok());
        assert!(validate_port(0).is_err());
    }
}
