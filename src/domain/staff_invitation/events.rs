use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outbox::core::DomainEvent;

// ============================================================================
// Staff Invitation Events - published on the "staff_invitation" stream
// ============================================================================

pub const STAFF_INVITATION_CREATED: &str = "StaffInvitationCreated";
pub const STAFF_INVITATION_RECIPIENTS_ADDED: &str = "StaffInvitationRecipientsAdded";
pub const STAFF_INVITATION_DELETED: &str = "StaffInvitationDeleted";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StaffInvitationEvent {
    Created {
        invitation_id: Uuid,
        creator_id: Uuid,
        code: String,
        recipients: Vec<String>,
        valid_until: DateTime<Utc>,
    },
    /// Only the addresses that were not already invited.
    RecipientsAdded {
        invitation_id: Uuid,
        code: String,
        recipients: Vec<String>,
        valid_until: DateTime<Utc>,
    },
    Deleted {
        invitation_id: Uuid,
    },
}

impl DomainEvent for StaffInvitationEvent {
    const STREAM: &'static str = "staff_invitation";
    const EVENT_TYPES: &'static [&'static str] = &[
        STAFF_INVITATION_CREATED,
        STAFF_INVITATION_RECIPIENTS_ADDED,
        STAFF_INVITATION_DELETED,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            StaffInvitationEvent::Created { .. } => STAFF_INVITATION_CREATED,
            StaffInvitationEvent::RecipientsAdded { .. } => STAFF_INVITATION_RECIPIENTS_ADDED,
            StaffInvitationEvent::Deleted { .. } => STAFF_INVITATION_DELETED,
        }
    }
}
