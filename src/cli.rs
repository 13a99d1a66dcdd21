use crate::utils::parse_duration;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Swarm Report - live statistics and exports for a load-testing run
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Interface the reporting server binds to
    #[clap(long, default_value = crate::defaults::WEB_HOST, help_heading = "Server Options")]
    pub web_host: String,

    /// Port the reporting server listens on
    #[clap(short = 'P', long, default_value_t = crate::defaults::WEB_PORT, help_heading = "Server Options")]
    pub web_port: u16,

    /// How long a polled stats payload is reused (e.g. "2s", "500ms")
    #[clap(long, value_parser = parse_duration, default_value = "2s", help_heading = "Cache Options")]
    pub cache_timeout: Duration,

    /// Upper bound the cache timeout may grow to when reports are slow to build
    #[clap(long, value_parser = parse_duration, default_value = "30s", help_heading = "Cache Options")]
    pub max_cache_timeout: Duration,

    /// Serve cached payloads for the full timeout even across run phase changes
    #[clap(long, default_value_t = false, help_heading = "Cache Options")]
    pub no_adaptive_cache: bool,

    /// Maximum number of operations and exceptions shown in the polling payload
    #[clap(long, default_value_t = crate::defaults::MAX_DISPLAY_ROWS)]
    pub max_rows: usize,

    /// Host under test, reported to dashboards
    #[clap(short = 'H', long)]
    pub host: Option<String>,

    /// Feed synthetic traffic into the statistics store
    #[clap(long, default_value_t = false)]
    pub demo: bool,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,

    /// Also write logs to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

/// Configuration the reporting library runs with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportingConfig {
    pub cache_timeout: Duration,
    pub max_cache_timeout: Duration,
    pub adaptive_cache: bool,
    pub max_rows: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            cache_timeout: crate::defaults::CACHE_TIMEOUT,
            max_cache_timeout: crate::defaults::MAX_CACHE_TIMEOUT,
            adaptive_cache: true,
            max_rows: crate::defaults::MAX_DISPLAY_ROWS,
        }
    }
}

impl From<&Args> for ReportingConfig {
    fn from(args: &Args) -> Self {
        Self {
            cache_timeout: args.cache_timeout,
            max_cache_timeout: args.max_cache_timeout.max(args.cache_timeout),
            adaptive_cache: !args.no_adaptive_cache,
            max_rows: args.max_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_library_defaults() {
        let args = Args::parse_from(["swarm-report"]);
        let config = ReportingConfig::from(&args);

        assert_eq!(config, ReportingConfig::default());
        assert_eq!(args.web_port, crate::defaults::WEB_PORT);
        assert!(args.host.is_none());
    }

    #[test]
    fn test_cache_flags() {
        let args = Args::parse_from([
            "swarm-report",
            "--cache-timeout",
            "500ms",
            "--max-cache-timeout",
            "100ms",
            "--no-adaptive-cache",
            "--max-rows",
            "50",
        ]);
        let config = ReportingConfig::from(&args);

        assert_eq!(config.cache_timeout, Duration::from_millis(500));
        assert_eq!(config.max_cache_timeout, Duration::from_millis(500));
        assert!(!config.adaptive_cache);
        assert_eq!(config.max_rows, 50);
    }

    #[test]
    fn test_rejects_bad_duration() {
        assert!(Args::try_parse_from(["swarm-report", "--cache-timeout", "soon"]).is_err());
    }
}
