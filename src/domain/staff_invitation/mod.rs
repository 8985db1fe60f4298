// ============================================================================
// Staff Invitation Domain
// ============================================================================
//
// Invitation codes let staff members bring colleagues in. Recipients are
// mailed when an invitation is created or extended.
//
// ============================================================================

pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;
pub mod persistence;

pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
