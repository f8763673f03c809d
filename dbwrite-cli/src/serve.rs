//! Serve command: provision, initialize schema, run HTTP until shutdown

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use dbwrite_server::db::pool::{DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_CONNECTIONS};
use dbwrite_server::db::PoolSettings;
use dbwrite_server::http::DEFAULT_PORT;
use dbwrite_server::{DbConfig, ServeOptions, DEFAULT_WRITE_DELAY};

/// Process options. Database settings come from the environment
/// (ENVIRONMENT, DB_HOST, DB_PORT, DB_USER, DB_PASS, DB_NAME, PROJECT_ID).
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interface to bind
    #[arg(long, env = "BIND_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_host: IpAddr,

    /// Time each transaction is held open between its two inserts, in milliseconds
    #[arg(long, env = "WRITE_DELAY_MS", default_value_t = DEFAULT_WRITE_DELAY.as_millis() as u64)]
    pub write_delay_ms: u64,

    /// Maximum pooled database connections
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    /// Seconds a request waits for a free connection before failing
    #[arg(long, env = "DB_ACQUIRE_TIMEOUT_SECS", default_value_t = DEFAULT_ACQUIRE_TIMEOUT.as_secs())]
    pub acquire_timeout_secs: u64,

    /// Create the record table and exit without serving
    #[arg(long)]
    pub init_schema_only: bool,
}

impl ServeArgs {
    fn options(&self) -> ServeOptions {
        ServeOptions {
            bind_addr: SocketAddr::new(self.bind_host, self.port),
            write_delay: Duration::from_millis(self.write_delay_ms),
            pool: PoolSettings {
                max_connections: self.max_connections,
                acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
            },
        }
    }
}

/// Run the recorder. Every error here is fatal.
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let db = DbConfig::from_env().context("Invalid database configuration")?;
    let options = args.options();

    if db.project_id.is_none() {
        tracing::info!("PROJECT_ID not set; rows will carry an empty trace id");
    }

    if args.init_schema_only {
        let pool = dbwrite_server::prepare(&db, options.pool)
            .await
            .context("Failed to prepare database")?;
        pool.close().await;
        tracing::info!("Schema initialized");
        return Ok(());
    }

    tracing::info!(
        bind = %options.bind_addr,
        write_delay_ms = args.write_delay_ms,
        mode = %db.mode,
        "Starting server"
    );

    dbwrite_server::serve(db, options)
        .await
        .context("Server error")?;

    Ok(())
}
