use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgQueryResult, PgRow};
use sqlx::{PgConnection, Postgres, Row, Transaction};
use std::marker::PhantomData;
use uuid::Uuid;

use super::{AggregateStore, Lookup, Offset, OutboxMessage, OutboxReader, OutboxRecord};
use crate::error::{Error, Result};
use crate::outbox::core::Aggregate;

// ============================================================================
// Postgres Backend (sqlx)
// ============================================================================
//
// - Row locks: SELECT ... FOR UPDATE inside the command transaction.
// - Lost updates: UPDATE ... WHERE id = $1 AND version = $2, zero rows fails.
// - Outbox rows carry the inserting transaction id. The relay only reads rows
//   whose transaction id is below the oldest in-flight transaction, so a
//   slow transaction that committed a lower position later is never skipped.
// - outbox_messages.stream references outbox_streams: publishing into a
//   stream no relay initialized fails on the foreign key.
//
// ============================================================================

const SCHEMA: &str = include_str!("../../../sql/schema.sql");

/// Create every table and index the crate uses. Idempotent.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    tracing::info!("Database schema applied");
    Ok(())
}

/// Column mapping for an aggregate table.
#[async_trait]
pub trait PgRecord: Aggregate + Sized {
    const TABLE: &'static str;

    /// Select list understood by `from_row`.
    const COLUMNS: &'static str;

    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error>;

    async fn insert(&self, conn: &mut PgConnection) -> std::result::Result<PgQueryResult, sqlx::Error>;

    /// Must include `AND version = $expected_version` in its WHERE clause.
    async fn update(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> std::result::Result<PgQueryResult, sqlx::Error>;
}

fn map_write_error(err: sqlx::Error, entity: &'static str) -> Error {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return Error::conflict(entity);
        }
    }
    Error::from(err)
}

pub struct PgStore<A> {
    pool: PgPool,
    _marker: PhantomData<fn() -> A>,
}

impl<A> Clone for PgStore<A> {
    fn clone(&self) -> Self {
        Self { pool: self.pool.clone(), _marker: PhantomData }
    }
}

impl<A: PgRecord> PgStore<A> {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, _marker: PhantomData }
    }
}

#[async_trait]
impl<A: PgRecord> AggregateStore<A> for PgStore<A> {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn insert(&self, tx: &mut Self::Tx, aggregate: &A) -> Result<u64> {
        let result = aggregate
            .insert(&mut **tx)
            .await
            .map_err(|e| map_write_error(e, A::AGGREGATE_TYPE))?;
        Ok(result.rows_affected())
    }

    async fn select_for_update(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<A>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 FOR UPDATE",
            A::COLUMNS,
            A::TABLE
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&mut **tx).await?;
        match row {
            Some(row) => Ok(Some(A::from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, tx: &mut Self::Tx, aggregate: &A, expected_version: i64) -> Result<u64> {
        let result = aggregate
            .update(&mut **tx, expected_version)
            .await
            .map_err(|e| map_write_error(e, A::AGGREGATE_TYPE))?;
        Ok(result.rows_affected())
    }

    async fn enqueue(&self, tx: &mut Self::Tx, messages: &[OutboxMessage]) -> Result<()> {
        insert_messages(&mut **tx, messages).await
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, lookup: &Lookup) -> Result<Option<A>> {
        let row = match lookup {
            Lookup::Id(id) => {
                let sql = format!("SELECT {} FROM {} WHERE id = $1", A::COLUMNS, A::TABLE);
                sqlx::query(&sql).bind(*id).fetch_optional(&self.pool).await?
            }
            Lookup::Field { column, value } => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE {} = $1 ORDER BY created_at DESC LIMIT 1",
                    A::COLUMNS,
                    A::TABLE,
                    column
                );
                sqlx::query(&sql).bind(value.as_str()).fetch_optional(&self.pool).await?
            }
        };
        match row {
            Some(row) => Ok(Some(A::from_row(&row)?)),
            None => Ok(None),
        }
    }
}

/// Insert outbox rows on an open connection (normally the command
/// transaction).
pub async fn insert_messages(conn: &mut PgConnection, messages: &[OutboxMessage]) -> Result<()> {
    for message in messages {
        let result = sqlx::query(
            "INSERT INTO outbox_messages (
                stream, event_id, event_type, event_version, aggregate_type,
                aggregate_id, payload, correlation_id, causation_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&message.stream)
        .bind(message.event_id)
        .bind(&message.event_type)
        .bind(message.event_version)
        .bind(&message.aggregate_type)
        .bind(message.aggregate_id)
        .bind(&message.payload)
        .bind(message.correlation_id)
        .bind(message.causation_id)
        .bind(message.created_at)
        .execute(&mut *conn)
        .await;

        if let Err(err) = result {
            let stream_missing = err
                .as_database_error()
                .map(|e| e.is_foreign_key_violation())
                .unwrap_or(false);
            if stream_missing {
                return Err(Error::StreamNotInitialized { stream: message.stream.clone() });
            }
            return Err(err.into());
        }
    }

    tracing::debug!(message_count = messages.len(), "Enqueued outbox messages");
    Ok(())
}

// ============================================================================
// Relay Side
// ============================================================================

#[derive(Clone)]
pub struct PgOutbox {
    pool: PgPool,
}

impl PgOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> std::result::Result<OutboxRecord, sqlx::Error> {
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(OutboxRecord {
        offset: Offset::new(row.try_get("transaction_id")?, row.try_get("position")?),
        message: OutboxMessage {
            stream: row.try_get("stream")?,
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            payload: row.try_get("payload")?,
            correlation_id: row.try_get("correlation_id")?,
            causation_id: row.try_get("causation_id")?,
            created_at,
        },
        inserted_at: row.try_get("inserted_at")?,
    })
}

#[async_trait]
impl OutboxReader for PgOutbox {
    async fn initialize_stream(&self, stream: &str) -> Result<()> {
        sqlx::query("INSERT INTO outbox_streams (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(stream)
            .execute(&self.pool)
            .await?;
        tracing::debug!(stream = %stream, "Outbox stream initialized");
        Ok(())
    }

    async fn register_consumer(&self, stream: &str, consumer: &str) -> Result<Offset> {
        sqlx::query(
            "INSERT INTO outbox_offsets (stream, consumer, last_transaction_id, last_position, updated_at)
             VALUES ($1, $2, 0, 0, now())
             ON CONFLICT (stream, consumer) DO NOTHING",
        )
        .bind(stream)
        .bind(consumer)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            let stream_missing = err
                .as_database_error()
                .map(|e| e.is_foreign_key_violation())
                .unwrap_or(false);
            if stream_missing {
                Error::StreamNotInitialized { stream: stream.to_string() }
            } else {
                err.into()
            }
        })?;

        let row = sqlx::query(
            "SELECT last_transaction_id, last_position FROM outbox_offsets
             WHERE stream = $1 AND consumer = $2",
        )
        .bind(stream)
        .bind(consumer)
        .fetch_one(&self.pool)
        .await?;

        Ok(Offset::new(row.try_get("last_transaction_id")?, row.try_get("last_position")?))
    }

    async fn fetch(&self, stream: &str, after: Offset, limit: usize) -> Result<Vec<OutboxRecord>> {
        let limit = i64::try_from(limit).map_err(Error::internal)?;
        let rows = sqlx::query(
            "SELECT transaction_id, position, stream, event_id, event_type, event_version,
                    aggregate_type, aggregate_id, payload, correlation_id, causation_id,
                    created_at, inserted_at
             FROM outbox_messages
             WHERE stream = $1
               AND (transaction_id, position) > ($2, $3)
               AND transaction_id < pg_snapshot_xmin(pg_current_snapshot())::text::bigint
             ORDER BY transaction_id, position
             LIMIT $4",
        )
        .bind(stream)
        .bind(after.transaction_id)
        .bind(after.position)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| record_from_row(row).map_err(Error::from))
            .collect()
    }

    async fn commit_offset(&self, stream: &str, consumer: &str, offset: Offset) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox_offsets
             SET last_transaction_id = $3, last_position = $4, updated_at = now()
             WHERE stream = $1 AND consumer = $2",
        )
        .bind(stream)
        .bind(consumer)
        .bind(offset.transaction_id)
        .bind(offset.position)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::internal(anyhow::anyhow!(
                "consumer {consumer} is not registered on stream {stream}"
            )));
        }
        Ok(())
    }
}
