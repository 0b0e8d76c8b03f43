//! Resilient API gateway.
//!
//! ```text
//!     Client ──▶ correlation ──▶ /api rate limit ──▶ auth relay
//!                                                      │
//!                                 resilient client ◀───┘
//!                                 (bulkhead, deadline, retries)
//!                                      │
//!                                      ▼
//!                                users service
//! ```

use clap::Parser;
use std::path::PathBuf;

use resilient_gateway::config::load_config;
use resilient_gateway::http::HttpServer;
use resilient_gateway::lifecycle::{signals, startup, Shutdown};
use resilient_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "resilient-gateway")]
#[command(about = "API gateway with bulkhead, retries and fail-open rate limiting", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(
        service = %config.observability.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Gateway starting"
    );
    tracing::info!(
        bind_address = %config.server.bind_address,
        upstream = %config.upstream.normalized_base(),
        bulkhead_limit = config.upstream.bulkhead_limit,
        max_retries = config.retries.max_retries,
        rate_limit_store = ?config.rate_limit.store,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = startup::bind(&config).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
