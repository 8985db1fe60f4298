use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// Staff Invitation Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum StaffInvitationCommand {
    Create {
        invitation_id: Uuid,
        creator_id: Uuid,
        recipients: Vec<String>,
        /// Defaults to the handler's validity period.
        valid_until: Option<DateTime<Utc>>,
    },
    AddRecipients {
        invitation_id: Uuid,
        recipients: Vec<String>,
    },
    Delete {
        invitation_id: Uuid,
    },
}

impl StaffInvitationCommand {
    pub fn invitation_id(&self) -> Uuid {
        match self {
            StaffInvitationCommand::Create { invitation_id, .. }
            | StaffInvitationCommand::AddRecipients { invitation_id, .. }
            | StaffInvitationCommand::Delete { invitation_id } => *invitation_id,
        }
    }
}
