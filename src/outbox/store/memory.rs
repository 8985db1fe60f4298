use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{AggregateStore, Lookup, Offset, OutboxMessage, OutboxReader, OutboxRecord};
use crate::error::{Error, Result};
use crate::outbox::core::Aggregate;

// ============================================================================
// In-Memory Backend
// ============================================================================
//
// Mirrors the Postgres semantics the repository relies on:
// - row locks held until the transaction ends (tokio mutex per row id)
// - staged writes applied atomically with their outbox rows on commit
// - dropping a transaction discards its writes and releases its locks
// - unique keys checked on insert and again on commit
//
// Commit failures can be injected to simulate a crash before commit.
//
// ============================================================================

/// How an aggregate exposes its unique and queryable columns to the
/// in-memory backend.
pub trait MemoryRecord: Aggregate + Clone {
    /// `(column, value)` pairs that must be unique across the table.
    fn unique_keys(&self) -> Vec<(&'static str, String)>;

    /// Value of a lookup column, if the aggregate has it.
    fn field(&self, column: &str) -> Option<String>;

    /// Field lookups return the newest matching row.
    fn created_at(&self) -> DateTime<Utc>;
}

#[derive(Default)]
struct OutboxState {
    streams: HashSet<String>,
    records: Vec<OutboxRecord>,
    offsets: HashMap<(String, String), Offset>,
    next_position: i64,
}

/// Shared outbox plus transaction bookkeeping. One per test "database".
#[derive(Default)]
pub struct InMemoryDatabase {
    outbox: Mutex<OutboxState>,
    next_transaction_id: AtomicI64,
    fail_next_commit: AtomicBool,
}

impl InMemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next commit fail before anything is applied.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Every committed outbox record of a stream, in offset order.
    pub async fn records(&self, stream: &str) -> Vec<OutboxRecord> {
        let outbox = self.outbox.lock().await;
        outbox
            .records
            .iter()
            .filter(|r| r.message.stream == stream)
            .cloned()
            .collect()
    }

    pub async fn committed_offset(&self, stream: &str, consumer: &str) -> Option<Offset> {
        let outbox = self.outbox.lock().await;
        outbox
            .offsets
            .get(&(stream.to_string(), consumer.to_string()))
            .copied()
    }

    /// Append raw rows to an initialized stream, bypassing any aggregate.
    /// Lets tests publish payloads no current event enum produces.
    pub async fn append(&self, messages: Vec<OutboxMessage>) -> Result<()> {
        let mut outbox = self.outbox.lock().await;
        Self::check_streams(&outbox, &messages)?;
        let transaction_id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst) + 1;
        Self::push_records(&mut outbox, transaction_id, messages);
        Ok(())
    }

    fn take_commit_failure(&self) -> bool {
        self.fail_next_commit.swap(false, Ordering::SeqCst)
    }

    fn check_streams(outbox: &OutboxState, messages: &[OutboxMessage]) -> Result<()> {
        match messages.iter().find(|m| !outbox.streams.contains(&m.stream)) {
            Some(m) => Err(Error::StreamNotInitialized { stream: m.stream.clone() }),
            None => Ok(()),
        }
    }

    fn push_records(outbox: &mut OutboxState, transaction_id: i64, messages: Vec<OutboxMessage>) {
        let inserted_at = Utc::now();
        for message in messages {
            outbox.next_position += 1;
            let offset = Offset::new(transaction_id, outbox.next_position);
            outbox.records.push(OutboxRecord { offset, message, inserted_at });
        }
    }
}

#[async_trait]
impl OutboxReader for InMemoryDatabase {
    async fn initialize_stream(&self, stream: &str) -> Result<()> {
        self.outbox.lock().await.streams.insert(stream.to_string());
        Ok(())
    }

    async fn register_consumer(&self, stream: &str, consumer: &str) -> Result<Offset> {
        let mut outbox = self.outbox.lock().await;
        if !outbox.streams.contains(stream) {
            return Err(Error::StreamNotInitialized { stream: stream.to_string() });
        }
        let offset = outbox
            .offsets
            .entry((stream.to_string(), consumer.to_string()))
            .or_default();
        Ok(*offset)
    }

    async fn fetch(&self, stream: &str, after: Offset, limit: usize) -> Result<Vec<OutboxRecord>> {
        let outbox = self.outbox.lock().await;
        Ok(outbox
            .records
            .iter()
            .filter(|r| r.message.stream == stream && r.offset > after)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn commit_offset(&self, stream: &str, consumer: &str, offset: Offset) -> Result<()> {
        let mut outbox = self.outbox.lock().await;
        match outbox.offsets.get_mut(&(stream.to_string(), consumer.to_string())) {
            Some(current) => {
                *current = offset;
                Ok(())
            }
            None => Err(Error::internal(anyhow::anyhow!(
                "consumer {consumer} is not registered on stream {stream}"
            ))),
        }
    }
}

// ============================================================================
// Aggregate Table
// ============================================================================

enum StagedWrite<A> {
    Insert(A),
    Update { row: A, expected_version: i64 },
}

/// Open in-memory transaction.
pub struct MemoryTx<A> {
    guards: Vec<OwnedMutexGuard<()>>,
    writes: Vec<StagedWrite<A>>,
    messages: Vec<OutboxMessage>,
}

pub struct MemoryStore<A> {
    db: Arc<InMemoryDatabase>,
    rows: Arc<Mutex<HashMap<Uuid, A>>>,
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl<A> Clone for MemoryStore<A> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            rows: self.rows.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<A: MemoryRecord> MemoryStore<A> {
    pub fn new(db: Arc<InMemoryDatabase>) -> Self {
        Self {
            db,
            rows: Arc::new(Mutex::new(HashMap::new())),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn database(&self) -> &Arc<InMemoryDatabase> {
        &self.db
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    async fn row_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // An entry nobody holds or waits on is referenced only by the map.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(id).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) async fn row_lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }

    fn violates_unique(rows: &HashMap<Uuid, A>, candidate: &A) -> bool {
        if rows.contains_key(&candidate.aggregate_id()) {
            return true;
        }
        let keys = candidate.unique_keys();
        rows.values().any(|existing| {
            existing
                .unique_keys()
                .iter()
                .any(|key| keys.contains(key))
        })
    }
}

#[async_trait]
impl<A: MemoryRecord> AggregateStore<A> for MemoryStore<A> {
    type Tx = MemoryTx<A>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(MemoryTx {
            guards: Vec::new(),
            writes: Vec::new(),
            messages: Vec::new(),
        })
    }

    async fn insert(&self, tx: &mut Self::Tx, aggregate: &A) -> Result<u64> {
        let rows = self.rows.lock().await;
        if Self::violates_unique(&rows, aggregate) {
            return Err(Error::conflict(A::AGGREGATE_TYPE));
        }
        tx.writes.push(StagedWrite::Insert(aggregate.clone()));
        Ok(1)
    }

    async fn select_for_update(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<A>> {
        let lock = self.row_lock(id).await;
        let guard = lock.lock_owned().await;
        tx.guards.push(guard);

        let rows = self.rows.lock().await;
        Ok(rows.get(&id).cloned())
    }

    async fn update(&self, tx: &mut Self::Tx, aggregate: &A, expected_version: i64) -> Result<u64> {
        let rows = self.rows.lock().await;
        match rows.get(&aggregate.aggregate_id()) {
            Some(current) if current.version() == expected_version => {
                tx.writes.push(StagedWrite::Update {
                    row: aggregate.clone(),
                    expected_version,
                });
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn enqueue(&self, tx: &mut Self::Tx, messages: &[OutboxMessage]) -> Result<()> {
        let outbox = self.db.outbox.lock().await;
        InMemoryDatabase::check_streams(&outbox, messages)?;
        tx.messages.extend_from_slice(messages);
        Ok(())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        if self.db.take_commit_failure() {
            return Err(Error::internal(anyhow::anyhow!("injected commit failure")));
        }

        let MemoryTx { guards, writes, messages } = tx;
        let mut rows = self.rows.lock().await;
        let mut outbox = self.db.outbox.lock().await;

        // Validate everything before applying anything.
        for write in &writes {
            match write {
                StagedWrite::Insert(row) => {
                    if Self::violates_unique(&rows, row) {
                        return Err(Error::conflict(A::AGGREGATE_TYPE));
                    }
                }
                StagedWrite::Update { row, expected_version } => {
                    let current = rows.get(&row.aggregate_id()).map(|r| r.version());
                    if current != Some(*expected_version) {
                        return Err(Error::internal(anyhow::anyhow!(
                            "lost update on {} {}",
                            A::AGGREGATE_TYPE,
                            row.aggregate_id()
                        )));
                    }
                }
            }
        }
        InMemoryDatabase::check_streams(&outbox, &messages)?;

        for write in writes {
            let row = match write {
                StagedWrite::Insert(row) => row,
                StagedWrite::Update { row, .. } => row,
            };
            rows.insert(row.aggregate_id(), row);
        }
        if !messages.is_empty() {
            let transaction_id = self.db.next_transaction_id.fetch_add(1, Ordering::SeqCst) + 1;
            InMemoryDatabase::push_records(&mut outbox, transaction_id, messages);
        }

        drop(outbox);
        drop(rows);
        drop(guards);
        Ok(())
    }

    async fn find(&self, lookup: &Lookup) -> Result<Option<A>> {
        let rows = self.rows.lock().await;
        Ok(match lookup {
            Lookup::Id(id) => rows.get(id).cloned(),
            Lookup::Field { column, value } => rows
                .values()
                .filter(|row| row.field(column).as_deref() == Some(value.as_str()))
                .max_by_key(|row| row.created_at())
                .cloned(),
        })
    }
}
