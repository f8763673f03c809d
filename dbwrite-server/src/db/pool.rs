//! Database connection pool provisioning
//!
//! Uses sqlx PgPool with explicit connection limits. How each connection
//! reaches the database is decided by a [`ConnectStrategy`]:
//!
//! - [`Direct`]: plain TCP to `host:port`
//! - [`SecureTunnel`]: the managed instance's connector socket, or
//!   verify-full TLS when no socket directory is configured

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;

use crate::config::{ConnectMode, DbConfig, TunnelConfig};

/// Default maximum connections for the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// How long a request waits for a free connection before failing.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

const APPLICATION_NAME: &str = "dbwrite";

/// Provisioning error. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("{strategy}: {reason}")]
    Options {
        strategy: &'static str,
        reason: String,
    },

    #[error("failed to connect ({strategy}): {source}")]
    Connect {
        strategy: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// A way of turning a [`DbConfig`] into connect options.
pub trait ConnectStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn connect_options(&self, config: &DbConfig) -> Result<PgConnectOptions, ProvisionError>;
}

fn base_options(config: &DbConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .username(&config.user)
        .password(&config.password)
        .database(&config.database)
        .port(config.port)
        .application_name(APPLICATION_NAME)
}

/// Plain network socket to `host:port`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl ConnectStrategy for Direct {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn connect_options(&self, config: &DbConfig) -> Result<PgConnectOptions, ProvisionError> {
        Ok(base_options(config)
            .host(&config.host)
            .ssl_mode(PgSslMode::Disable))
    }
}

/// Authenticated, encrypted channel to a managed instance.
///
/// With a socket directory the connector process owns auth and encryption and
/// exposes the instance at `{socket_dir}/{instance}/.s.PGSQL.{port}`.
/// Without one the driver itself negotiates verify-full TLS.
#[derive(Debug, Clone)]
pub struct SecureTunnel {
    tunnel: TunnelConfig,
}

impl SecureTunnel {
    pub fn new(tunnel: TunnelConfig) -> Self {
        Self { tunnel }
    }
}

impl ConnectStrategy for SecureTunnel {
    fn name(&self) -> &'static str {
        "secure-tunnel"
    }

    fn connect_options(&self, config: &DbConfig) -> Result<PgConnectOptions, ProvisionError> {
        let options = base_options(config);

        if let Some(dir) = &self.tunnel.socket_dir {
            let socket = dir.join(self.tunnel.instance.as_str());
            tracing::debug!(socket = %socket.display(), "routing through connector socket");
            return Ok(options.socket(socket));
        }

        let options = options.host(&config.host).ssl_mode(PgSslMode::VerifyFull);
        match &self.tunnel.root_cert {
            Some(cert) if !cert.exists() => Err(ProvisionError::Options {
                strategy: self.name(),
                reason: format!("root certificate {} does not exist", cert.display()),
            }),
            Some(cert) => Ok(options.ssl_root_cert(cert)),
            None => Ok(options),
        }
    }
}

/// Pick the strategy for the configured mode.
pub fn strategy_for(config: &DbConfig) -> Result<Box<dyn ConnectStrategy>, ProvisionError> {
    match (config.mode, &config.tunnel) {
        (ConnectMode::Direct, _) => Ok(Box::new(Direct)),
        (ConnectMode::SecureTunnel, Some(tunnel)) => Ok(Box::new(SecureTunnel::new(tunnel.clone()))),
        (ConnectMode::SecureTunnel, None) => Err(ProvisionError::Options {
            strategy: "secure-tunnel",
            reason: "no instance configured".into(),
        }),
    }
}

/// Pool sizing
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// Bound on how long a request queues for a connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

/// Builds the process-wide pool. Consumed by [`Provisioner::connect`], so a
/// provisioner yields at most one pool.
pub struct Provisioner {
    strategy: Box<dyn ConnectStrategy>,
    settings: PoolSettings,
}

impl Provisioner {
    pub fn new(strategy: Box<dyn ConnectStrategy>, settings: PoolSettings) -> Self {
        Self { strategy, settings }
    }

    /// Provisioner for the mode named in `config`.
    pub fn for_config(config: &DbConfig, settings: PoolSettings) -> Result<Self, ProvisionError> {
        Ok(Self::new(strategy_for(config)?, settings))
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Open the pool. Establishes one connection up front and fails if it
    /// cannot; there is no retry here.
    pub async fn connect(self, config: &DbConfig) -> Result<PgPool, ProvisionError> {
        let strategy = self.strategy.name();
        let options = self.strategy.connect_options(config)?;

        tracing::info!(
            strategy,
            max_connections = self.settings.max_connections,
            acquire_timeout_secs = self.settings.acquire_timeout.as_secs(),
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|source| ProvisionError::Connect { strategy, source })?;

        tracing::info!(strategy, "Database pool ready");
        Ok(pool)
    }
}
