// ============================================================================
// Staff Invitation Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StaffInvitationError {
    #[error("Invitation must list at least one recipient")]
    NoRecipients,

    #[error("Invalid recipient address: {0}")]
    InvalidEmail(String),

    #[error("Invitation validity window is empty")]
    InvalidValidityWindow,

    #[error("Invitation has expired")]
    Expired,

    #[error("Invitation has been deleted")]
    Deleted,

    #[error("Only staff members can invite staff")]
    CreatorNotStaff,
}

impl StaffInvitationError {
    pub fn code(&self) -> &'static str {
        match self {
            StaffInvitationError::NoRecipients => "staff_invitation.no_recipients",
            StaffInvitationError::InvalidEmail(_) => "staff_invitation.invalid_email",
            StaffInvitationError::InvalidValidityWindow => "staff_invitation.invalid_validity_window",
            StaffInvitationError::Expired => "staff_invitation.expired",
            StaffInvitationError::Deleted => "staff_invitation.deleted",
            StaffInvitationError::CreatorNotStaff => "staff_invitation.creator_not_staff",
        }
    }
}
