//! dbwrite - HTTP-triggered transactional recorder
//!
//! Each request to `/` writes a BEGIN row, holds the transaction open for a
//! configurable delay, writes an END row, and commits. Useful for watching
//! long-held transactions and pool exhaustion under concurrent load.

use anyhow::Result;
use clap::Parser;

mod serve;
mod tracing_setup;

use serve::ServeArgs;
use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "dbwrite",
    author,
    version,
    about = "HTTP-triggered transactional recorder for PostgreSQL",
    long_about = "Serves an endpoint that records a BEGIN/END pair inside one long-held \
                  transaction per request, correlated by the request's trace header."
)]
struct Cli {
    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(long)]
    debug: bool,

    /// Export spans over OTLP (needs the telemetry feature)
    #[arg(long)]
    otel: bool,

    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing so .env values feed the env-backed flags
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_setup::init(&TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })?;

    match dotenv {
        Ok(path) => tracing::info!("Loaded configuration from {}", path.display()),
        Err(_) => tracing::debug!("No .env file found, using environment variables only"),
    }

    let result = serve::run_serve(cli.serve).await;
    tracing_setup::shutdown_otel();
    result
}
