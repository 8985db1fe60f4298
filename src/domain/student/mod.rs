// ============================================================================
// Student Domain
// ============================================================================

pub mod events;
pub mod errors;
pub mod aggregate;
pub mod command_handler;
pub mod persistence;

pub use events::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
