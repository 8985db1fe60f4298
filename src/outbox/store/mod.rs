// ============================================================================
// Outbox Store - Transactional Persistence Layer
// ============================================================================
//
// Two seams:
// - AggregateStore<A>: the transactional primitives a repository needs
//   (begin, lock-read, write, enqueue, commit) for one aggregate table.
// - OutboxReader: what the relay needs (stream bootstrap, ordered fetch,
//   per-consumer offsets).
//
// Backends: Postgres (sqlx) for production, in-memory for tests.
//
// ============================================================================

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::outbox::core::{
    decode_event, serialize_event, Aggregate, Decoded, DomainEvent, EventEnvelope,
};

pub use memory::{InMemoryDatabase, MemoryRecord, MemoryStore, MemoryTx};
pub use postgres::{apply_schema, PgOutbox, PgRecord, PgStore};

/// Serialized event waiting to be inserted into the outbox.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub stream: String,
    pub event_id: Uuid,
    pub event_type: String,
    pub event_version: i32,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub payload: String,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn from_envelope<E: DomainEvent>(envelope: &EventEnvelope<E>) -> anyhow::Result<Self> {
        Ok(Self {
            stream: envelope.stream.clone(),
            event_id: envelope.event_id,
            event_type: envelope.event_type.clone(),
            event_version: envelope.event_version,
            aggregate_type: envelope.aggregate_type.clone(),
            aggregate_id: envelope.aggregate_id,
            payload: serialize_event(&envelope.event_data)?,
            correlation_id: envelope.correlation_id,
            causation_id: envelope.causation_id,
            created_at: envelope.created_at,
        })
    }
}

/// Position of a committed outbox row. Ordered by committing transaction
/// first, then by insert position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset {
    pub transaction_id: i64,
    pub position: i64,
}

impl Offset {
    pub fn new(transaction_id: i64, position: i64) -> Self {
        Self { transaction_id, position }
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.position)
    }
}

/// Committed outbox row as seen by the relay.
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub offset: Offset,
    pub message: OutboxMessage,
    pub inserted_at: DateTime<Utc>,
}

impl OutboxRecord {
    /// Rebuild the typed envelope, or `Unknown` for an event type this
    /// deployment does not know about.
    pub fn decode<E: DomainEvent>(&self) -> anyhow::Result<Decoded<EventEnvelope<E>>> {
        let m = &self.message;
        let event_data = match decode_event::<E>(&m.event_type, &m.payload)? {
            Decoded::Known(event) => event,
            Decoded::Unknown => return Ok(Decoded::Unknown),
        };

        Ok(Decoded::Known(EventEnvelope {
            event_id: m.event_id,
            aggregate_id: m.aggregate_id,
            aggregate_type: m.aggregate_type.clone(),
            stream: m.stream.clone(),
            event_type: m.event_type.clone(),
            event_version: m.event_version,
            event_data,
            causation_id: m.causation_id,
            correlation_id: m.correlation_id,
            created_at: m.created_at,
        }))
    }
}

/// Non-locking read key. `column` names are trusted, never user input.
#[derive(Debug, Clone)]
pub enum Lookup {
    Id(Uuid),
    Field { column: &'static str, value: String },
}

impl Lookup {
    pub fn field(column: &'static str, value: impl Into<String>) -> Self {
        Lookup::Field { column, value: value.into() }
    }
}

/// Transactional primitives for one aggregate table plus the outbox.
///
/// Dropping a `Tx` without calling `commit` must discard every staged write
/// and release every row lock it holds.
#[async_trait]
pub trait AggregateStore<A: Aggregate>: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx>;

    /// Insert a brand-new row. Unique violations surface as `Conflict`.
    /// Returns the number of affected rows.
    async fn insert(&self, tx: &mut Self::Tx, aggregate: &A) -> Result<u64>;

    /// Read a row holding an exclusive lock until the transaction ends.
    async fn select_for_update(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<A>>;

    /// Write a row if its stored version still equals `expected_version`.
    /// Returns the number of affected rows.
    async fn update(&self, tx: &mut Self::Tx, aggregate: &A, expected_version: i64) -> Result<u64>;

    /// Insert outbox rows on the same transaction as the aggregate write.
    async fn enqueue(&self, tx: &mut Self::Tx, messages: &[OutboxMessage]) -> Result<()>;

    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    async fn find(&self, lookup: &Lookup) -> Result<Option<A>>;
}

/// Relay-side access to the outbox.
#[async_trait]
pub trait OutboxReader: Send + Sync + 'static {
    /// Register a stream so publishers may write to it. Idempotent.
    async fn initialize_stream(&self, stream: &str) -> Result<()>;

    /// Create the consumer's offset row if missing and return the committed
    /// offset.
    async fn register_consumer(&self, stream: &str, consumer: &str) -> Result<Offset>;

    /// Committed rows strictly after `after`, in offset order.
    async fn fetch(&self, stream: &str, after: Offset, limit: usize) -> Result<Vec<OutboxRecord>>;

    async fn commit_offset(&self, stream: &str, consumer: &str, offset: Offset) -> Result<()>;
}
