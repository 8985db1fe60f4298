use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::outbox::core::{Decoded, DomainEvent, EventEnvelope};
use crate::outbox::store::OutboxRecord;

// ============================================================================
// Event Handlers
// ============================================================================
//
// Handlers see typed envelopes. Delivery is at-least-once, so a handler may
// see the same event_id again after a crash between handling and offset
// commit; handlers must tolerate that.
//
// ============================================================================

#[async_trait]
pub trait EventHandler<E: DomainEvent>: Send + Sync + 'static {
    async fn handle(&self, event: &EventEnvelope<E>) -> anyhow::Result<()>;

    /// Used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl<E, H> EventHandler<E> for Arc<H>
where
    E: DomainEvent,
    H: EventHandler<E> + ?Sized,
{
    async fn handle(&self, event: &EventEnvelope<E>) -> anyhow::Result<()> {
        (**self).handle(event).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Adapts an async closure into an [`EventHandler`].
pub struct HandlerFn<F> {
    f: F,
}

pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn { f }
}

#[async_trait]
impl<E, F, Fut> EventHandler<E> for HandlerFn<F>
where
    E: DomainEvent,
    F: Fn(EventEnvelope<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &EventEnvelope<E>) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }

    fn name(&self) -> &'static str {
        "handler_fn"
    }
}

// ============================================================================
// Type-Erased Dispatch
// ============================================================================

/// What happened to one outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Handled,
    /// Event type unknown to this deployment; acknowledged untouched.
    Skipped,
}

/// One consumer's view of a stream, decoupled from the event type.
#[async_trait]
pub(crate) trait Dispatch: Send + Sync + 'static {
    async fn dispatch(&self, record: &OutboxRecord) -> anyhow::Result<Delivery>;
}

/// Delivers every event to a list of handlers; fails if any of them fails.
pub(crate) struct HandlersDispatch<E: DomainEvent> {
    handlers: Vec<Arc<dyn EventHandler<E>>>,
}

impl<E: DomainEvent> HandlersDispatch<E> {
    pub(crate) fn new(handlers: Vec<Arc<dyn EventHandler<E>>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl<E: DomainEvent> Dispatch for HandlersDispatch<E> {
    async fn dispatch(&self, record: &OutboxRecord) -> anyhow::Result<Delivery> {
        let envelope = match record.decode::<E>()? {
            Decoded::Known(envelope) => envelope,
            Decoded::Unknown => return Ok(Delivery::Skipped),
        };

        let mut failures = Vec::new();
        for handler in &self.handlers {
            if let Err(e) = handler.handle(&envelope).await {
                tracing::warn!(
                    handler = handler.name(),
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    error = %e,
                    "Event handler failed"
                );
                failures.push(format!("{}: {e:#}", handler.name()));
            }
        }

        if failures.is_empty() {
            Ok(Delivery::Handled)
        } else {
            Err(anyhow::anyhow!(
                "{} of {} handlers failed: {}",
                failures.len(),
                self.handlers.len(),
                failures.join("; ")
            ))
        }
    }
}
