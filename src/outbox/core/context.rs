use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::event::EventEnvelope;

/// Per-command metadata threaded through repositories into event headers.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub deadline: Option<Instant>,
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::now_v7(),
            causation_id: None,
            deadline: None,
        }
    }

    /// Context for work triggered by a delivered event: same correlation,
    /// caused by that event.
    pub fn caused_by<E>(event: &EventEnvelope<E>) -> Self {
        Self {
            correlation_id: event.correlation_id,
            causation_id: Some(event.event_id),
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The tighter of the context deadline and `now + fallback`.
    pub fn effective_deadline(&self, fallback: Duration) -> Instant {
        let fallback = Instant::now() + fallback;
        match self.deadline {
            Some(deadline) if deadline < fallback => deadline,
            _ => fallback,
        }
    }
}
