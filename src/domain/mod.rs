// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Value objects
// - Events
// - Commands
// - Errors
// - Aggregate implementation
// - Command handler
// - Persistence (row mapping for the outbox store backends)
//
// Aggregates only know the outbox core traits; transactions, locking and
// event publication are the repository's job.
//
// ============================================================================

pub mod registration;
pub mod staff_invitation;
pub mod student;
