use super::value_objects::RegistrationStatus;

// ============================================================================
// Registration Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("Verification code has expired")]
    CodeExpired,

    #[error("Verification code does not match")]
    CodeMismatch,

    #[error("Too many wrong verification codes, request a new one")]
    AttemptsExceeded,

    #[error("A new code cannot be sent yet")]
    CooldownActive,

    #[error("Cannot {action} a registration in status {from}")]
    InvalidStateTransition {
        from: RegistrationStatus,
        action: &'static str,
    },

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("First and last name are required")]
    IncompleteProfile,

    #[error("A student with this email already exists")]
    EmailTaken,
}

impl RegistrationError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistrationError::CodeExpired => "registration.code_expired",
            RegistrationError::CodeMismatch => "registration.code_mismatch",
            RegistrationError::AttemptsExceeded => "registration.attempts_exceeded",
            RegistrationError::CooldownActive => "registration.cooldown_active",
            RegistrationError::InvalidStateTransition { .. } => "registration.invalid_state_transition",
            RegistrationError::InvalidEmail(_) => "registration.invalid_email",
            RegistrationError::IncompleteProfile => "registration.incomplete_profile",
            RegistrationError::EmailTaken => "registration.email_taken",
        }
    }
}
