//! Transactional write executor
//!
//! One call to [`WriteExecutor::record`] runs:
//!
//! ```text
//! IDLE -> BEGUN -> BEGIN_WRITTEN -> DELAYING -> END_WRITTEN -> COMMITTED
//!            \            \             \             \
//!             `------------`-------------`-------------`--> ROLLED_BACK
//! ```
//!
//! The delay runs with the transaction (and its pooled connection) held.
//! Any failure rolls back before returning. If the returned future is
//! dropped mid-flight the open transaction is dropped with it, which rolls
//! back and hands the connection back to the pool.

use std::fmt;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta, Timelike, Utc};
use tokio::time::Instant;

use crate::db::{DbError, NewRecord, Phase, RecordStore, RecordTx};

/// Default time the transaction is held open between the two inserts.
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_secs(5);

/// Step at which a write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Begin,
    InsertBegin,
    InsertEnd,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Begin => "begin transaction",
            Self::InsertBegin => "insert BEGIN record",
            Self::InsertEnd => "insert END record",
            Self::Commit => "commit transaction",
        })
    }
}

/// A failed write. Nothing from the attempt is visible.
#[derive(Debug, thiserror::Error)]
#[error("failed to {stage}: {source}")]
pub struct WriteError {
    pub stage: Stage,
    #[source]
    pub source: DbError,
}

/// Outcome of a committed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub trace_id: String,
    pub begin_id: i32,
    pub end_id: i32,
    pub begun_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
}

/// Runs the begin/delay/end transaction against a [`RecordStore`].
pub struct WriteExecutor<S> {
    store: S,
    delay: Duration,
}

impl<S: RecordStore> WriteExecutor<S> {
    pub fn new(store: S, delay: Duration) -> Self {
        Self { store, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Write a matched BEGIN/END pair for `trace_id`, or nothing at all.
    #[tracing::instrument(name = "record_write", skip_all, fields(trace_id = %trace_id))]
    pub async fn record(&self, trace_id: &str) -> Result<WriteReceipt, WriteError> {
        let mut tx = self.store.begin().await.map_err(|source| {
            tracing::error!(error = %source, "failed to begin transaction");
            WriteError {
                stage: Stage::Begin,
                source,
            }
        })?;

        let begin = record_now(trace_id, Phase::Begin);
        let held_since = Instant::now();
        let inserted = tx.insert(&begin).await;
        let begin_id = match inserted {
            Ok(id) => id,
            Err(source) => return Err(abort(tx, Stage::InsertBegin, source).await),
        };
        tracing::info!(id = begin_id, "Begin record inserted");

        tracing::info!(delay_ms = saturating_millis(self.delay), "Holding transaction open");
        tokio::time::sleep(self.delay).await;

        let end = NewRecord {
            trace_id: trace_id.to_string(),
            phase: Phase::End,
            timestamp: end_timestamp(begin.timestamp, held_since.elapsed()),
        };
        let inserted = tx.insert(&end).await;
        let end_id = match inserted {
            Ok(id) => id,
            Err(source) => return Err(abort(tx, Stage::InsertEnd, source).await),
        };
        tracing::info!(id = end_id, "End record inserted");

        tx.commit().await.map_err(|source| {
            tracing::error!(error = %source, "commit failed");
            WriteError {
                stage: Stage::Commit,
                source,
            }
        })?;
        tracing::info!("Transaction committed");

        Ok(WriteReceipt {
            trace_id: trace_id.to_string(),
            begin_id,
            end_id,
            begun_at: begin.timestamp,
            ended_at: end.timestamp,
        })
    }
}

fn record_now(trace_id: &str, phase: Phase) -> NewRecord {
    NewRecord {
        trace_id: trace_id.to_string(),
        phase,
        timestamp: to_micros(Utc::now().naive_utc()),
    }
}

/// `TIMESTAMP` keeps microseconds; truncate so receipts match stored rows.
fn to_micros(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(t.nanosecond() / 1_000 * 1_000).unwrap_or(t)
}

/// END is never earlier than BEGIN plus the time actually held, even if the
/// wall clock stepped backwards during the delay.
fn end_timestamp(begun_at: NaiveDateTime, held: Duration) -> NaiveDateTime {
    let floor = TimeDelta::from_std(held)
        .ok()
        .and_then(|held| begun_at.checked_add_signed(held))
        .unwrap_or(begun_at);
    let ended = to_micros(Utc::now().naive_utc().max(floor));
    if ended < floor {
        ended + TimeDelta::microseconds(1)
    } else {
        ended
    }
}

/// Milliseconds for logs and reports, saturating instead of truncating.
pub(crate) fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Roll back after a failed step. The step's error wins over a rollback
/// error; an unrolled transaction is still discarded when its connection
/// is reset.
async fn abort<T: RecordTx>(tx: T, stage: Stage, source: DbError) -> WriteError {
    tracing::error!(%stage, error = %source, "write failed, rolling back");
    if let Err(e) = tx.rollback().await {
        tracing::warn!(%stage, error = %e, "rollback failed");
    }
    WriteError { stage, source }
}
