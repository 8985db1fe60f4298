use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use anyhow::Result;

// ============================================================================
// Event Envelope - Header + Typed Payload
// ============================================================================
//
// Wraps a domain event with the metadata the outbox and the relay need:
// identity, origin aggregate, stream, and causation/correlation ids.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,

    // Routing
    pub stream: String,
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation
    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,

    pub created_at: DateTime<Utc>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_type: &str,
        aggregate_id: Uuid,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            stream: E::STREAM.to_string(),
            event_type: event_data.event_type().to_string(),
            event_version: event_data.event_version(),
            event_data,
            causation_id: None,
            correlation_id,
            created_at: Utc::now(),
        }
    }

    pub fn with_causation(mut self, causation_id: Option<Uuid>) -> Self {
        self.causation_id = causation_id;
        self
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// Every event enum belongs to exactly one stream, so all subscribers of a
/// stream agree on the payload type they decode.
pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
    /// Logical topic the event is published on.
    const STREAM: &'static str;

    /// Every event type name this enum can decode.
    const EVENT_TYPES: &'static [&'static str];

    fn event_type(&self) -> &'static str;

    fn event_version(&self) -> i32 {
        1
    }
}

/// Result of decoding an outbox payload for a given event enum.
#[derive(Debug)]
pub enum Decoded<E> {
    Known(E),
    /// Published by a newer deployment; subscribers skip it.
    Unknown,
}

pub fn serialize_event<E: Serialize>(event: &E) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

pub fn deserialize_event<E: DeserializeOwned>(json: &str) -> Result<E> {
    Ok(serde_json::from_str(json)?)
}

/// Decode a stored payload, treating unlisted event types as unknown rather
/// than as errors.
pub fn decode_event<E: DomainEvent>(event_type: &str, payload: &str) -> Result<Decoded<E>> {
    if !E::EVENT_TYPES.contains(&event_type) {
        return Ok(Decoded::Unknown);
    }
    Ok(Decoded::Known(deserialize_event(payload)?))
}
