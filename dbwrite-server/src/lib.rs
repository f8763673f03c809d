//! dbwrite-server: HTTP-triggered transactional recorder
//!
//! Every request to `/` opens a transaction, writes a `BEGIN` row, holds the
//! transaction open for a fixed delay, writes an `END` row and commits. Both
//! rows carry the request's trace correlation id.

pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod http;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub use config::{ConnectMode, DbConfig};
pub use error::{Error, Result};
pub use executor::{WriteError, WriteExecutor, WriteReceipt, DEFAULT_WRITE_DELAY};

use db::{ensure_record_table, PgRecordStore, PoolSettings, Provisioner};
use http::{AppState, ServerConfig};

/// Process-level options not tied to the database
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub bind_addr: SocketAddr,
    pub write_delay: Duration,
    pub pool: PoolSettings,
}

/// Provision the pool and make sure the `record` table exists.
pub async fn prepare(db: &DbConfig, pool: PoolSettings) -> Result<sqlx::PgPool> {
    let provisioner = Provisioner::for_config(db, pool)?;
    tracing::info!(mode = %db.mode, strategy = provisioner.strategy_name(), "Provisioning database pool");
    let pool = provisioner.connect(db).await?;

    ensure_record_table(&pool).await.map_err(Error::Schema)?;
    Ok(pool)
}

/// Start the HTTP server and run until shutdown, then close the pool.
pub async fn serve(db: DbConfig, options: ServeOptions) -> Result<()> {
    let pool = prepare(&db, options.pool).await?;

    let executor = WriteExecutor::new(PgRecordStore::new(pool.clone()), options.write_delay);
    let state = Arc::new(AppState::new(executor, db.project_id.clone()));

    let served = http::run_server(
        state,
        ServerConfig {
            bind_addr: options.bind_addr,
        },
    )
    .await;

    pool.close().await;
    tracing::info!("Database pool closed");

    served.map_err(Error::from)
}
