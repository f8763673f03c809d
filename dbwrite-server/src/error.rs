//! Startup error types for dbwrite-server
//!
//! Everything here is fatal: the process stops before (or instead of)
//! serving traffic. Per-request failures live in [`crate::executor`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::db::ProvisionError;
use crate::http::ServerError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("connection provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("schema initialization failed: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("server error: {0}")]
    Server(#[from] ServerError),
}

pub type Result<T> = std::result::Result<T, Error>;
