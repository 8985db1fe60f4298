use futures_util::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout_at;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::metrics::{Metrics, UnitOfWorkResult};
use crate::outbox::core::{Aggregate, CommandContext, DomainEvent, EventEnvelope, Outcome};
use crate::outbox::store::{AggregateStore, Lookup, OutboxMessage};

// ============================================================================
// Aggregate Repository - Unit of Work
// ============================================================================
//
// Orchestrates: begin → lock row → mutate → write row → enqueue events → commit
//
// The row write and the outbox insert share one transaction, so either both
// become visible or neither does. Mutations report their result as an
// Outcome; CommitWithError persists the changed state before surfacing the
// error to the caller.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RepositoryConfig {
    /// Upper bound for one unit of work when the command context carries no
    /// tighter deadline.
    pub command_timeout: Duration,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Repository<A, S> {
    store: S,
    metrics: Arc<Metrics>,
    config: RepositoryConfig,
    _marker: PhantomData<fn() -> A>,
}

impl<A, S> Repository<A, S>
where
    A: Aggregate,
    S: AggregateStore<A>,
{
    pub fn new(store: S, metrics: Arc<Metrics>, config: RepositoryConfig) -> Self {
        Self {
            store,
            metrics,
            config,
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert a brand-new aggregate and its initial events atomically.
    pub async fn save(&self, ctx: &CommandContext, aggregate: &mut A) -> Result<()> {
        let aggregate_id = aggregate.aggregate_id();
        let deadline = ctx.effective_deadline(self.config.command_timeout);

        let result = match timeout_at(deadline, self.save_in_transaction(ctx, aggregate)).await {
            Ok(result) => result,
            Err(_) => Err(Error::internal(anyhow::anyhow!(
                "deadline exceeded saving {} {}",
                A::AGGREGATE_TYPE,
                aggregate_id
            ))),
        };

        match &result {
            Ok(event_count) => {
                self.metrics
                    .record_unit_of_work(A::AGGREGATE_TYPE, UnitOfWorkResult::Committed);
                tracing::info!(
                    aggregate_type = A::AGGREGATE_TYPE,
                    aggregate_id = %aggregate_id,
                    event_count = *event_count,
                    "Aggregate saved"
                );
            }
            Err(e) => {
                self.metrics
                    .record_unit_of_work(A::AGGREGATE_TYPE, UnitOfWorkResult::RolledBack);
                tracing::warn!(
                    aggregate_type = A::AGGREGATE_TYPE,
                    aggregate_id = %aggregate_id,
                    error = %e,
                    "Failed to save aggregate"
                );
            }
        }

        result.map(|_| ())
    }

    async fn save_in_transaction(&self, ctx: &CommandContext, aggregate: &mut A) -> Result<usize> {
        let mut tx = self.store.begin().await?;

        let affected = self.store.insert(&mut tx, aggregate).await?;
        if affected == 0 {
            return Err(Error::internal(anyhow::anyhow!(
                "insert of {} {} affected no rows",
                A::AGGREGATE_TYPE,
                aggregate.aggregate_id()
            )));
        }

        let messages = self.drain_messages(ctx, aggregate)?;
        if !messages.is_empty() {
            self.store.enqueue(&mut tx, &messages).await?;
        }

        self.store.commit(tx).await?;
        self.metrics.record_enqueued(<A::Event as DomainEvent>::STREAM, messages.len());
        Ok(messages.len())
    }

    /// Load the aggregate under an exclusive row lock, apply `mutate`, and
    /// persist the result together with the events it recorded.
    ///
    /// The closure receives the locked aggregate and returns an [`Outcome`]:
    /// `Rollback` leaves nothing behind, `CommitWithError` commits and then
    /// returns its error.
    pub async fn update<F>(&self, ctx: &CommandContext, id: Uuid, mutate: F) -> Result<()>
    where
        F: for<'a> FnOnce(&'a mut A) -> BoxFuture<'a, Outcome> + Send,
    {
        let deadline = ctx.effective_deadline(self.config.command_timeout);

        let result = match timeout_at(deadline, self.update_in_transaction(ctx, id, mutate)).await {
            Ok(result) => result,
            Err(_) => Err(Error::internal(anyhow::anyhow!(
                "deadline exceeded updating {} {}",
                A::AGGREGATE_TYPE,
                id
            ))),
        };

        // Ok(Some(_)) carries the error of a committed `CommitWithError`.
        let (unit_of_work, result) = match result {
            Ok(None) => (UnitOfWorkResult::Committed, Ok(())),
            Ok(Some(err)) => (UnitOfWorkResult::CommittedWithError, Err(err)),
            Err(err) => (UnitOfWorkResult::RolledBack, Err(err)),
        };
        self.metrics.record_unit_of_work(A::AGGREGATE_TYPE, unit_of_work);

        if let Err(e) = &result {
            tracing::debug!(
                aggregate_type = A::AGGREGATE_TYPE,
                aggregate_id = %id,
                error = %e,
                error_code = e.code(),
                "Update finished with error"
            );
        }
        result
    }

    /// `update` for mutations that need no awaiting.
    pub async fn update_with<F>(&self, ctx: &CommandContext, id: Uuid, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut A) -> Outcome + Send,
    {
        self.update(ctx, id, move |aggregate| {
            let outcome = mutate(aggregate);
            Box::pin(async move { outcome })
        })
        .await
    }

    async fn update_in_transaction<F>(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        mutate: F,
    ) -> Result<Option<Error>>
    where
        F: for<'a> FnOnce(&'a mut A) -> BoxFuture<'a, Outcome> + Send,
    {
        let mut tx = self.store.begin().await?;

        let mut aggregate = self
            .store
            .select_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| Error::not_found(A::AGGREGATE_TYPE))?;
        let expected_version = aggregate.version();

        let deferred = match mutate(&mut aggregate).await {
            Outcome::Commit => None,
            Outcome::CommitWithError(err) => Some(err),
            // Dropping the transaction rolls it back and releases the lock.
            Outcome::Rollback(err) => return Err(err),
        };

        aggregate.set_version(expected_version + 1);
        let affected = self.store.update(&mut tx, &aggregate, expected_version).await?;
        if affected == 0 {
            return Err(Error::internal(anyhow::anyhow!(
                "update of {} {} affected no rows (expected version {})",
                A::AGGREGATE_TYPE,
                id,
                expected_version
            )));
        }

        let messages = self.drain_messages(ctx, &mut aggregate)?;
        if !messages.is_empty() {
            self.store.enqueue(&mut tx, &messages).await?;
        }

        self.store.commit(tx).await?;
        self.metrics.record_enqueued(<A::Event as DomainEvent>::STREAM, messages.len());

        tracing::info!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %id,
            version = expected_version + 1,
            event_count = messages.len(),
            persisted_failure = deferred.is_some(),
            "Aggregate updated"
        );

        Ok(deferred)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<A> {
        self.find_one(&Lookup::Id(id)).await
    }

    pub async fn find_one(&self, lookup: &Lookup) -> Result<A> {
        self.store
            .find(lookup)
            .await?
            .ok_or_else(|| Error::not_found(A::AGGREGATE_TYPE))
    }

    fn drain_messages(&self, ctx: &CommandContext, aggregate: &mut A) -> Result<Vec<OutboxMessage>> {
        let aggregate_id = aggregate.aggregate_id();
        aggregate
            .drain_events()
            .into_iter()
            .map(|event| {
                let envelope =
                    EventEnvelope::new(A::AGGREGATE_TYPE, aggregate_id, event, ctx.correlation_id)
                        .with_causation(ctx.causation_id);
                OutboxMessage::from_envelope(&envelope).map_err(Error::Internal)
            })
            .collect()
    }
}
