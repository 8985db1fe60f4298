// ============================================================================
// Outbox Core - Generic Aggregate and Event Abstractions
// ============================================================================
//
// No domain-specific code lives here; every aggregate and event type in
// src/domain/ plugs into these traits.
//
// ============================================================================

pub mod aggregate;
pub mod context;
pub mod event;

pub use aggregate::{Aggregate, Outcome, PendingEvents};
pub use context::CommandContext;
pub use event::{
    decode_event, deserialize_event, serialize_event, Decoded, DomainEvent, EventEnvelope,
};
