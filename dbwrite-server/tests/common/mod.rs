//! In-process `RecordStore` double.
//!
//! Mirrors what the PostgreSQL store guarantees: bounded connections
//! (a semaphore), store-assigned ids, rows visible only after commit, and
//! rollback when a transaction is dropped unfinished. Faults can be injected
//! at any step.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dbwrite_server::db::{DbError, NewRecord, Phase, Record, RecordStore, RecordTx};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Begin,
    Insert(Phase),
    Commit,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    committed: Mutex<Vec<Record>>,
    next_id: AtomicI32,
    connections: Arc<Semaphore>,
    fault: Option<Fault>,
    open: AtomicUsize,
    max_open: AtomicUsize,
    rollbacks: AtomicUsize,
}

fn simulated(message: &str) -> DbError {
    DbError::Sqlx(sqlx::Error::Protocol(message.to_string()))
}

impl MemoryStore {
    pub fn new(max_connections: usize) -> Self {
        Self::build(max_connections, None)
    }

    pub fn failing(max_connections: usize, fault: Fault) -> Self {
        Self::build(max_connections, Some(fault))
    }

    fn build(max_connections: usize, fault: Option<Fault>) -> Self {
        Self {
            inner: Arc::new(Inner {
                committed: Mutex::new(Vec::new()),
                next_id: AtomicI32::new(0),
                connections: Arc::new(Semaphore::new(max_connections)),
                fault,
                open: AtomicUsize::new(0),
                max_open: AtomicUsize::new(0),
                rollbacks: AtomicUsize::new(0),
            }),
        }
    }

    pub fn committed(&self) -> Vec<Record> {
        self.inner.committed.lock().unwrap().clone()
    }

    pub fn rows_for(&self, trace_id: &str) -> Vec<Record> {
        self.committed()
            .into_iter()
            .filter(|r| r.trace_id == trace_id)
            .collect()
    }

    pub fn open_transactions(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn max_open_transactions(&self) -> usize {
        self.inner.max_open.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, DbError> {
        if self.inner.fault == Some(Fault::Begin) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }

        let permit = self
            .inner
            .connections
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DbError::Sqlx(sqlx::Error::PoolClosed))?;

        let open = self.inner.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_open.fetch_max(open, Ordering::SeqCst);

        Ok(MemoryTx {
            inner: Arc::clone(&self.inner),
            pending: Vec::new(),
            finished: false,
            _permit: permit,
        })
    }
}

pub struct MemoryTx {
    inner: Arc<Inner>,
    pending: Vec<Record>,
    finished: bool,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl RecordTx for MemoryTx {
    async fn insert(&mut self, record: &NewRecord) -> Result<i32, DbError> {
        if self.inner.fault == Some(Fault::Insert(record.phase)) {
            return Err(simulated(
                "duplicate key value violates unique constraint \"record_pkey\"",
            ));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.push(Record {
            id,
            trace_id: record.trace_id.clone(),
            phase: record.phase,
            timestamp: record.timestamp,
        });
        Ok(id)
    }

    async fn commit(mut self) -> Result<(), DbError> {
        if self.inner.fault == Some(Fault::Commit) {
            return Err(simulated("could not serialize access"));
        }

        let rows = std::mem::take(&mut self.pending);
        self.inner.committed.lock().unwrap().extend(rows);
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), DbError> {
        self.pending.clear();
        self.finished = true;
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.open.fetch_sub(1, Ordering::SeqCst);
    }
}
