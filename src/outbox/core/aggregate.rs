use uuid::Uuid;

use super::event::DomainEvent;
use crate::error::Error;

// ============================================================================
// Aggregate Contract - Current-State Entities with Pending Events
// ============================================================================
//
// Aggregates are stored as rows, not replayed from events. A mutation updates
// the in-memory state and records zero or more events; the repository drains
// those events into the outbox inside the same transaction as the row write.
//
// ============================================================================

pub trait Aggregate: Send + Sync + 'static {
    type Event: DomainEvent;

    /// Used as the outbox `aggregate_type` and in log/metric labels.
    const AGGREGATE_TYPE: &'static str;

    fn aggregate_id(&self) -> Uuid;

    /// Row version compared on update to detect lost updates.
    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);

    /// Remove and return every event recorded since the last drain.
    fn drain_events(&mut self) -> Vec<Self::Event>;
}

/// Events recorded by an aggregate and not yet handed to the outbox.
#[derive(Debug, Clone)]
pub struct PendingEvents<E> {
    events: Vec<E>,
}

impl<E> Default for PendingEvents<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E> PendingEvents<E> {
    pub fn record(&mut self, event: E) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.events.iter()
    }
}

// ============================================================================
// Mutation Outcome
// ============================================================================

/// Tagged result of a unit-of-work mutation.
#[must_use]
#[derive(Debug)]
pub enum Outcome {
    /// Persist the new state and events.
    Commit,
    /// Discard everything and report the error.
    Rollback(Error),
    /// Persist the new state and events, then report the error.
    CommitWithError(Error),
}

impl Outcome {
    pub fn rollback(err: impl Into<Error>) -> Self {
        Outcome::Rollback(err.into())
    }

    pub fn commit_with_error(err: impl Into<Error>) -> Self {
        Outcome::CommitWithError(err.into())
    }

    pub fn commits(&self) -> bool {
        !matches!(self, Outcome::Rollback(_))
    }
}

/// Plain `Result`s from aggregate methods are fatal on error.
impl<E: Into<Error>> From<Result<(), E>> for Outcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Outcome::Commit,
            Err(e) => Outcome::Rollback(e.into()),
        }
    }
}
