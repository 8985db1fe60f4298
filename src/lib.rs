// ============================================================================
// campus_core - transactional outbox for campus aggregates
// ============================================================================
//
// outbox   - unit-of-work repository, outbox store and relay
// domain   - registration, staff invitation and student aggregates
// handlers - relay consumers (mails, student provisioning)
// ports    - capabilities the core consumes; adapters implement them
//
// ============================================================================

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod outbox;
pub mod ports;
pub mod utils;

pub use error::{Error, Result};
