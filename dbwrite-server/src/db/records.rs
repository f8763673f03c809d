//! Record repository
//!
//! A record is one half of a begin/end pair written inside a single
//! transaction. The store is abstracted behind [`RecordStore`] so the write
//! path can run against the PostgreSQL pool or an in-process double.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("unknown record type '{0}'")]
    UnknownPhase(String),
}

/// Which half of the transaction a row represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Begin,
    End,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "BEGIN",
            Self::End => "END",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "BEGIN" => Ok(Self::Begin),
            "END" => Ok(Self::End),
            other => Err(DbError::UnknownPhase(other.to_string())),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row to insert; the id is assigned by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub trace_id: String,
    pub phase: Phase,
    pub timestamp: NaiveDateTime,
}

/// Record as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: i32,
    pub trace_id: String,
    pub phase: Phase,
    pub timestamp: NaiveDateTime,
}

/// Source of record transactions.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    type Tx: RecordTx;

    /// Acquire a connection and open a transaction on it. May wait for pool
    /// capacity.
    async fn begin(&self) -> Result<Self::Tx, DbError>;
}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait RecordTx: Send + Sized {
    /// Insert a row, returning its id.
    async fn insert(&mut self, record: &NewRecord) -> Result<i32, DbError>;

    async fn commit(self) -> Result<(), DbError>;

    async fn rollback(self) -> Result<(), DbError>;
}

const INSERT_RECORD: &str =
    "INSERT INTO record (trace_id, type, timestamp) VALUES ($1, $2, $3) RETURNING id";

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Committed rows for one correlation id, oldest first.
    pub async fn list_for_trace(&self, trace_id: &str) -> Result<Vec<Record>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT id, trace_id, type, timestamp
            FROM record
            WHERE trace_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(trace_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let phase: Option<String> = r.try_get("type")?;
                Ok(Record {
                    id: r.try_get("id")?,
                    trace_id: r.try_get::<Option<String>, _>("trace_id")?.unwrap_or_default(),
                    phase: Phase::parse(phase.as_deref().unwrap_or_default())?,
                    timestamp: r.try_get("timestamp")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    type Tx = PgRecordTx;

    async fn begin(&self) -> Result<PgRecordTx, DbError> {
        let tx = self.pool.begin().await?;
        Ok(PgRecordTx { tx })
    }
}

/// Transaction on a pooled PostgreSQL connection. sqlx rolls it back on drop.
pub struct PgRecordTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RecordTx for PgRecordTx {
    async fn insert(&mut self, record: &NewRecord) -> Result<i32, DbError> {
        let (id,): (i32,) = sqlx::query_as(INSERT_RECORD)
            .bind(&record.trace_id)
            .bind(record.phase.as_str())
            .bind(record.timestamp)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn commit(self) -> Result<(), DbError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), DbError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
