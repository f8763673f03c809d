//! Database configuration - environment loading
//!
//! Configuration is loaded from environment variables:
//! - `ENVIRONMENT`: deployment mode (`PROD` selects the secure tunnel)
//! - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASS`, `DB_NAME`: required
//! - `PROJECT_ID`: enables trace correlation (optional)
//! - `INSTANCE_URI`: logical instance identifier (secure tunnel only)
//! - `DB_SOCKET_DIR`, `DB_ROOT_CERT`: tunnel endpoint options (optional)

use std::fmt;
use std::path::PathBuf;

/// Configuration error. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// How connections reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Plain TCP to `host:port`
    Direct,
    /// Authenticated, encrypted channel to a managed instance
    SecureTunnel,
}

impl ConnectMode {
    /// Map the `ENVIRONMENT` value to a mode. Anything that is not a
    /// production marker connects directly.
    pub fn from_environment(value: &str) -> Self {
        match value.trim() {
            "PROD" | "prod" | "production" | "secure-tunnel" => Self::SecureTunnel,
            _ => Self::Direct,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::SecureTunnel => "secure-tunnel",
        }
    }
}

impl fmt::Display for ConnectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical instance identifier,
/// `projects/{project}/locations/{region}/clusters/{cluster}/instances/{instance}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceUri(String);

impl InstanceUri {
    const KEYS: [&'static str; 4] = ["projects", "locations", "clusters", "instances"];

    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            var: "INSTANCE_URI",
            reason: format!("{reason} (got '{value}')"),
        };

        let segments: Vec<&str> = value.trim_matches('/').split('/').collect();
        if segments.len() != Self::KEYS.len() * 2 {
            return Err(invalid(
                "expected projects/<p>/locations/<r>/clusters/<c>/instances/<i>",
            ));
        }

        for (pair, key) in segments.chunks(2).zip(Self::KEYS) {
            if pair[0] != key {
                return Err(invalid(&format!("expected segment '{key}'")));
            }
            if pair[1].is_empty() {
                return Err(invalid(&format!("empty value after '{key}'")));
            }
        }

        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options used only by the secure tunnel strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub instance: InstanceUri,
    /// Directory holding the local connector sockets
    pub socket_dir: Option<PathBuf>,
    /// CA bundle for verify-full TLS when no socket is used
    pub root_cert: Option<PathBuf>,
}

/// Database configuration bundle
#[derive(Clone)]
pub struct DbConfig {
    pub mode: ConnectMode,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Enables trace correlation when set
    pub project_id: Option<String>,
    /// Present iff `mode` is `SecureTunnel`
    pub tunnel: Option<TunnelConfig>,
}

impl DbConfig {
    const REQUIRED: [&'static str; 6] = [
        "ENVIRONMENT",
        "DB_HOST",
        "DB_PORT",
        "DB_USER",
        "DB_PASS",
        "DB_NAME",
    ];

    /// Create config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup (for testing)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let missing: Vec<&'static str> = Self::REQUIRED
            .into_iter()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let required = |key: &'static str| get(key).unwrap_or_default();

        let port_raw = required("DB_PORT");
        let port = port_raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
            var: "DB_PORT",
            reason: format!("'{port_raw}': {e}"),
        })?;

        let mode = ConnectMode::from_environment(&required("ENVIRONMENT"));
        let tunnel = match mode {
            ConnectMode::Direct => None,
            ConnectMode::SecureTunnel => {
                let uri = get("INSTANCE_URI").ok_or(ConfigError::Missing(vec!["INSTANCE_URI"]))?;
                Some(TunnelConfig {
                    instance: InstanceUri::parse(&uri)?,
                    socket_dir: get("DB_SOCKET_DIR").map(PathBuf::from),
                    root_cert: get("DB_ROOT_CERT").map(PathBuf::from),
                })
            }
        };

        Ok(Self {
            mode,
            host: required("DB_HOST"),
            port,
            user: required("DB_USER"),
            password: required("DB_PASS"),
            database: required("DB_NAME"),
            project_id: get("PROJECT_ID"),
            tunnel,
        })
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("mode", &self.mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("project_id", &self.project_id)
            .field("tunnel", &self.tunnel)
            .finish()
    }
}
