use uuid::Uuid;

use super::value_objects::StudentProfile;

// ============================================================================
// Registration Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone)]
pub enum RegistrationCommand {
    Start {
        registration_id: Uuid,
        email: String,
    },
    MarkCodeSent {
        registration_id: Uuid,
    },
    Verify {
        registration_id: Uuid,
        code: String,
    },
    ResendCode {
        registration_id: Uuid,
    },
    CompleteAsStudent {
        registration_id: Uuid,
        profile: StudentProfile,
        group_id: Uuid,
    },
}

impl RegistrationCommand {
    pub fn registration_id(&self) -> Uuid {
        match self {
            RegistrationCommand::Start { registration_id, .. }
            | RegistrationCommand::MarkCodeSent { registration_id }
            | RegistrationCommand::Verify { registration_id, .. }
            | RegistrationCommand::ResendCode { registration_id }
            | RegistrationCommand::CompleteAsStudent { registration_id, .. } => *registration_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RegistrationCommand::Start { .. } => "start",
            RegistrationCommand::MarkCodeSent { .. } => "mark_code_sent",
            RegistrationCommand::Verify { .. } => "verify",
            RegistrationCommand::ResendCode { .. } => "resend_code",
            RegistrationCommand::CompleteAsStudent { .. } => "complete_as_student",
        }
    }
}
