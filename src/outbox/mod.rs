// ============================================================================
// Transactional Outbox
// ============================================================================
//
// core       - aggregate, event and command-context contracts
// store      - transactional persistence (Postgres, in-memory)
// repository - load-under-lock / mutate / persist / enqueue unit of work
// relay      - polling consumers delivering outbox records to handlers
//
// ============================================================================

pub mod core;
pub mod relay;
pub mod repository;
pub mod store;
