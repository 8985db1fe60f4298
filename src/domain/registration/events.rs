use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outbox::core::DomainEvent;

// ============================================================================
// Registration Events - published on the "registration" stream
// ============================================================================

pub const REGISTRATION_STARTED: &str = "RegistrationStarted";
pub const VERIFICATION_CODE_RESENT: &str = "VerificationCodeResent";
pub const REGISTRATION_STUDENT_COMPLETED: &str = "RegistrationStudentCompleted";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RegistrationEvent {
    /// A registration was opened and its first code must be mailed.
    Started {
        registration_id: Uuid,
        email: String,
        verification_code: String,
        code_expires_at: DateTime<Utc>,
    },
    /// A replacement code was issued.
    CodeResent {
        registration_id: Uuid,
        email: String,
        verification_code: String,
        code_expires_at: DateTime<Utc>,
    },
    /// A verified registration asked to become a student.
    StudentCompleted {
        registration_id: Uuid,
        email: String,
        first_name: String,
        last_name: String,
        group_id: Uuid,
    },
}

impl DomainEvent for RegistrationEvent {
    const STREAM: &'static str = "registration";
    const EVENT_TYPES: &'static [&'static str] = &[
        REGISTRATION_STARTED,
        VERIFICATION_CODE_RESENT,
        REGISTRATION_STUDENT_COMPLETED,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            RegistrationEvent::Started { .. } => REGISTRATION_STARTED,
            RegistrationEvent::CodeResent { .. } => VERIFICATION_CODE_RESENT,
            RegistrationEvent::StudentCompleted { .. } => REGISTRATION_STUDENT_COMPLETED,
        }
    }
}

impl RegistrationEvent {
    pub fn registration_id(&self) -> Uuid {
        match self {
            RegistrationEvent::Started { registration_id, .. }
            | RegistrationEvent::CodeResent { registration_id, .. }
            | RegistrationEvent::StudentCompleted { registration_id, .. } => *registration_id,
        }
    }
}
