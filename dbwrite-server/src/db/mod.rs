//! Database layer - pool provisioning, schema, and the record store
//!
//! # Design Principles
//!
//! - One pool per process, built once at startup and passed in explicitly
//! - Each write owns one pooled connection for the life of its transaction
//! - Atomicity comes from the database transaction, never from app-side cleanup

pub mod pool;
pub mod records;
pub mod schema;

pub use pool::{
    strategy_for, ConnectStrategy, Direct, PoolSettings, ProvisionError, Provisioner,
    SecureTunnel,
};
pub use records::{DbError, NewRecord, Phase, PgRecordStore, PgRecordTx, Record, RecordStore, RecordTx};
pub use schema::ensure_record_table;
