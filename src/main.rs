//! # Swarm Report - Main Entry Point
//!
//! Starts the reporting server for a load-testing run.
//!
//! ## Startup Sequence
//!
//! 1. **Parse arguments**: Server, cache and logging flags
//! 2. **Initialize logging**: Colorized console output, optional log file
//! 3. **Create the statistics store** shared by the run and the web layer
//! 4. **Optionally start the demo feed** so dashboards have data to show
//! 5. **Serve** the reporting endpoints until Ctrl+C or SIGTERM
//!
//! ## Error Handling
//!
//! Startup failures (bad port, unbindable address, unwritable log file) abort
//! with an `anyhow` error. Once serving, report failures are answered per
//! request and never stop the server.

use anyhow::{Context, Result};
use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use swarm_report::{
    cli::{Args, ReportingConfig},
    logging::init_logging,
    runner::{RunMode, RunState},
    service::ReportingService,
    stats::InMemoryStats,
    utils::{format_duration, validate_port},
    web, VERSION,
};
use tokio::signal;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.verbose, args.log_file.as_deref())?;

    info!("Starting Swarm Report v{}", VERSION);
    debug!("Configuration: {:?}", args);

    validate_port(args.web_port)?;
    let config = ReportingConfig::from(&args);
    info!(
        "Response cache timeout {} (adaptive: {}, max {}), showing up to {} rows",
        format_duration(config.cache_timeout),
        config.adaptive_cache,
        format_duration(config.max_cache_timeout),
        config.max_rows
    );

    let stats = Arc::new(InMemoryStats::new());
    stats.set_host(args.host.clone());

    if args.demo {
        info!("Demo feed enabled, generating synthetic traffic");
        tokio::spawn(demo_feed(Arc::clone(&stats)));
    }

    let service = Arc::new(ReportingService::new(stats, &config));
    let app = web::router(service);

    let addr: SocketAddr = format!("{}:{}", args.web_host, args.web_port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.web_host, args.web_port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Reporting server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Swarm Report stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Ctrl+C handler installation failed: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler installation failed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

const DEMO_OPERATIONS: [(&str, &str); 5] = [
    ("GET", "/"),
    ("GET", "/catalog"),
    ("GET", "/item/[id]"),
    ("POST", "/cart"),
    ("POST", "/login"),
];

/// Hatch a small simulated swarm and keep logging requests against it
async fn demo_feed(stats: Arc<InMemoryStats>) {
    let mut rng = StdRng::from_entropy();
    let nodes: Vec<String> = (0..3).map(|_| uuid::Uuid::new_v4().to_string()).collect();

    stats.set_mode(RunMode::Distributed {
        slave_count: nodes.len(),
    });
    stats.set_state(RunState::Hatching);

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut users = 0usize;
    loop {
        ticker.tick().await;

        if users < 50 {
            users += 1;
            stats.set_user_count(users);
            if users == 50 {
                stats.set_state(RunState::Running);
            }
        }

        for _ in 0..users / 5 + 1 {
            let (method, name) = DEMO_OPERATIONS[rng.gen_range(0..DEMO_OPERATIONS.len())];
            let response_time = rng.gen_range(5..400) + rng.gen_range(0..4) * rng.gen_range(0..600);
            let logged = if rng.gen_bool(0.03) {
                stats.log_failure(method, name, response_time, "HTTP 500")
            } else {
                stats.log_request(method, name, response_time, rng.gen_range(200..8000))
            };
            if let Err(e) = logged {
                warn!("Demo feed failed to record a request: {}", e);
            }
        }

        if rng.gen_bool(0.01) {
            let node = &nodes[rng.gen_range(0..nodes.len())];
            stats.log_exception(
                "ConnectionResetError: connection reset by peer",
                "Traceback (most recent call last):\n  File \"tasks.py\", line 12, in checkout",
                node,
            );
        }
    }
}
