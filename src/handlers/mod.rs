// ============================================================================
// Event Handlers - side effects driven by the outbox relay
// ============================================================================
//
// Every handler here may see an event more than once and is written so a
// replay is harmless (idempotent writes, or duplicate mails at worst).
//
// ============================================================================

pub mod registration;
pub mod staff_invitation;
pub mod student;

pub use registration::{StudentProvisioningHandler, VerificationMailHandler};
pub use staff_invitation::{InvitationMailHandler, InvitationReceiptHandler};
pub use student::WelcomeMailHandler;
