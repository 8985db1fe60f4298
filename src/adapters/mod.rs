// ============================================================================
// Adapters - Implementations of crate::ports
// ============================================================================

pub mod directory;
pub mod mail;
pub mod system;

pub use directory::{InMemoryDirectory, PgDirectory};
pub use mail::LogMailSender;
pub use system::{RandomCodeGenerator, SystemClock};
