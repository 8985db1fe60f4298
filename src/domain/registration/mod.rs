// ============================================================================
// Registration Domain - Email Verification Flow
// ============================================================================
//
// - Value objects (RegistrationStatus, VerificationPolicy, StudentProfile)
// - Events (RegistrationStarted, VerificationCodeResent, RegistrationStudentCompleted)
// - Commands and their handler
// - Errors (RegistrationError)
// - Aggregate (Registration state machine)
// - Persistence (Postgres and in-memory row mapping, lookups)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;
pub mod persistence;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
