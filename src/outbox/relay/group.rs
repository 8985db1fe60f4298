use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::handler::{EventHandler, HandlersDispatch};
use super::processor::{RelayConfig, RelayHandle, Subscriptions};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::outbox::core::DomainEvent;
use crate::outbox::store::OutboxReader;

/// Several handlers behind one consumer identity. An event is acknowledged
/// only once every handler of the group succeeded; otherwise the whole group
/// sees it again.
pub struct EventGroupProcessor {
    subscriptions: Subscriptions,
}

impl EventGroupProcessor {
    pub fn new(reader: Arc<dyn OutboxReader>, config: RelayConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            subscriptions: Subscriptions::new(reader, config, metrics),
        }
    }

    pub async fn add_handlers_group<E: DomainEvent>(
        &mut self,
        group_name: &str,
        handlers: Vec<Arc<dyn EventHandler<E>>>,
    ) -> Result<()> {
        if handlers.is_empty() {
            return Err(Error::internal(anyhow::anyhow!(
                "handler group {group_name} has no handlers"
            )));
        }

        tracing::debug!(
            group = %group_name,
            handlers = ?handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            "Registering handler group"
        );
        self.subscriptions
            .subscribe(E::STREAM, group_name, Arc::new(HandlersDispatch::new(handlers)))
            .await
    }

    pub fn group_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn start(self, token: &CancellationToken) -> RelayHandle {
        self.subscriptions.start(token)
    }
}
