use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::handler::{Delivery, Dispatch, EventHandler, HandlersDispatch};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::outbox::core::DomainEvent;
use crate::outbox::store::{Offset, OutboxReader, OutboxRecord};
use crate::utils::retry::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Event Relay - Outbox Polling Consumers
// ============================================================================
//
// One long-lived task per consumer:
//   tick → fetch after committed offset → dispatch (with retry) → commit offset
//
// - Offsets are committed after every event, so a crash redelivers at most
//   the event that was in flight.
// - A record that still fails after retries stops the batch; it is fetched
//   again on the next tick. Nothing after it is delivered meanwhile.
// - Cancellation is observed between events and while backing off, never
//   between a successful dispatch and its offset commit.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    /// Records fetched per query.
    pub batch_size: usize,
    /// Backoff applied to a failing handler within one poll.
    pub retry: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            retry: RetryConfig::default(),
        }
    }
}

pub(crate) struct Subscription {
    stream: &'static str,
    consumer: String,
    dispatch: Arc<dyn Dispatch>,
}

/// Registered consumers of one processor, not yet running.
pub(crate) struct Subscriptions {
    reader: Arc<dyn OutboxReader>,
    config: RelayConfig,
    metrics: Arc<Metrics>,
    entries: Vec<Subscription>,
}

impl Subscriptions {
    pub(crate) fn new(reader: Arc<dyn OutboxReader>, config: RelayConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            reader,
            config,
            metrics,
            entries: Vec::new(),
        }
    }

    /// Initialize the stream and the consumer's offset row, then remember the
    /// consumer for `start`.
    pub(crate) async fn subscribe(
        &mut self,
        stream: &'static str,
        consumer: &str,
        dispatch: Arc<dyn Dispatch>,
    ) -> Result<()> {
        if self
            .entries
            .iter()
            .any(|s| s.stream == stream && s.consumer == consumer)
        {
            return Err(Error::conflict("event consumer"));
        }

        self.reader.initialize_stream(stream).await?;
        let offset = self.reader.register_consumer(stream, consumer).await?;
        tracing::info!(
            stream = stream,
            consumer = %consumer,
            offset = %offset,
            "Consumer registered"
        );

        self.entries.push(Subscription {
            stream,
            consumer: consumer.to_string(),
            dispatch,
        });
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn start(self, token: &CancellationToken) -> RelayHandle {
        let token = token.child_token();
        let tasks = self
            .entries
            .into_iter()
            .map(|subscription| {
                let consumer = ConsumerLoop {
                    reader: self.reader.clone(),
                    config: self.config.clone(),
                    metrics: self.metrics.clone(),
                    subscription,
                };
                tokio::spawn(consumer.run(token.clone()))
            })
            .collect();

        RelayHandle { token, tasks }
    }
}

// ============================================================================
// Per-Handler Processor
// ============================================================================

/// Every handler gets its own consumer identity and offset.
pub struct EventProcessor {
    subscriptions: Subscriptions,
}

impl EventProcessor {
    pub fn new(reader: Arc<dyn OutboxReader>, config: RelayConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            subscriptions: Subscriptions::new(reader, config, metrics),
        }
    }

    /// Subscribe `handler` to `E::STREAM` under the consumer name `name`.
    ///
    /// Fails with `Conflict` if `name` is already used on that stream by this
    /// processor.
    pub async fn add_handler<E, H>(&mut self, name: &str, handler: H) -> Result<()>
    where
        E: DomainEvent,
        H: EventHandler<E>,
    {
        let handlers: Vec<Arc<dyn EventHandler<E>>> = vec![Arc::new(handler)];
        self.subscriptions
            .subscribe(E::STREAM, name, Arc::new(HandlersDispatch::new(handlers)))
            .await
    }

    pub fn consumer_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Spawn one polling task per handler. Cancelling `token` (or calling
    /// [`RelayHandle::shutdown`]) stops them.
    pub fn start(self, token: &CancellationToken) -> RelayHandle {
        self.subscriptions.start(token)
    }
}

// ============================================================================
// Running Relay
// ============================================================================

pub struct RelayHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop every consumer and wait for them to finish the event in hand.
    pub async fn shutdown(self) {
        self.token.cancel();
        self.join().await;
    }

    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Relay consumer task panicked");
            }
        }
    }
}

// ============================================================================
// Consumer Loop
// ============================================================================

struct ConsumerLoop {
    reader: Arc<dyn OutboxReader>,
    config: RelayConfig,
    metrics: Arc<Metrics>,
    subscription: Subscription,
}

impl ConsumerLoop {
    async fn run(self, token: CancellationToken) {
        let stream = self.subscription.stream;
        let consumer = self.subscription.consumer.as_str();

        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut offset: Option<Offset> = None;

        tracing::info!(stream = stream, consumer = %consumer, "Consumer started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Re-read the committed offset until it is known.
            let current = match offset {
                Some(current) => current,
                None => match self.reader.register_consumer(stream, consumer).await {
                    Ok(committed) => committed,
                    Err(e) => {
                        tracing::warn!(
                            stream = stream,
                            consumer = %consumer,
                            error = %e,
                            "Failed to load consumer offset"
                        );
                        continue;
                    }
                },
            };

            offset = Some(self.poll(current, &token).await);
        }

        tracing::info!(
            stream = stream,
            consumer = %consumer,
            offset = ?offset,
            "Consumer stopped"
        );
    }

    /// Deliver everything available after `offset`. Returns the last
    /// committed offset.
    async fn poll(&self, mut offset: Offset, token: &CancellationToken) -> Offset {
        let stream = self.subscription.stream;
        let consumer = self.subscription.consumer.as_str();
        let batch_size = self.config.batch_size.max(1);

        loop {
            let batch = match self.reader.fetch(stream, offset, batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(stream = stream, consumer = %consumer, error = %e, "Outbox fetch failed");
                    return offset;
                }
            };
            if batch.is_empty() {
                return offset;
            }
            let full = batch.len() >= batch_size;

            for record in &batch {
                if token.is_cancelled() || !self.deliver(record, token).await {
                    return offset;
                }

                if let Err(e) = self.reader.commit_offset(stream, consumer, record.offset).await {
                    // Redelivered on the next poll.
                    tracing::error!(
                        stream = stream,
                        consumer = %consumer,
                        offset = %record.offset,
                        error = %e,
                        "Failed to commit consumer offset"
                    );
                    return offset;
                }
                offset = record.offset;
            }

            if !full {
                return offset;
            }
        }
    }

    /// Dispatch one record with retries. `true` when it may be acknowledged.
    async fn deliver(&self, record: &OutboxRecord, token: &CancellationToken) -> bool {
        let consumer = self.subscription.consumer.as_str();
        let event_type = record.message.event_type.as_str();
        let dispatch = &self.subscription.dispatch;
        let started = Instant::now();

        let result = retry_with_backoff(&self.config.retry, token, |attempt| {
            if attempt > 1 {
                self.metrics.record_retry_attempt(consumer, attempt);
            }
            dispatch.dispatch(record)
        })
        .await;

        match result {
            RetryResult::Success(Delivery::Handled) => {
                self.metrics
                    .record_delivered(consumer, event_type, started.elapsed().as_secs_f64());
                tracing::debug!(
                    consumer = %consumer,
                    event_id = %record.message.event_id,
                    event_type = %event_type,
                    offset = %record.offset,
                    "Event delivered"
                );
                true
            }
            RetryResult::Success(Delivery::Skipped) => {
                self.metrics.record_skipped(consumer, event_type);
                tracing::info!(
                    consumer = %consumer,
                    event_id = %record.message.event_id,
                    event_type = %event_type,
                    "Skipping unknown event type"
                );
                true
            }
            RetryResult::Failed(e) => {
                self.metrics.record_failed(consumer, event_type);
                tracing::error!(
                    consumer = %consumer,
                    event_id = %record.message.event_id,
                    event_type = %event_type,
                    offset = %record.offset,
                    error = %e,
                    "Event left for redelivery"
                );
                false
            }
            RetryResult::Cancelled(_) => false,
        }
    }
}
