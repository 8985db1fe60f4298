use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::registration::normalize_email;
use crate::outbox::core::{Aggregate, PendingEvents};
use super::errors::StaffInvitationError;
use super::events::StaffInvitationEvent;

// ============================================================================
// Staff Invitation Aggregate
// ============================================================================

#[derive(Debug, Clone)]
pub struct StaffInvitation {
    // Identity
    pub id: Uuid,
    pub version: i64,

    pub creator_id: Uuid,
    pub code: String,
    /// Lower-cased, first-seen order, no duplicates.
    pub recipients: Vec<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    events: PendingEvents<StaffInvitationEvent>,
}

/// Normalize, validate and de-duplicate a list of addresses.
fn normalize_recipients(raw: &[String]) -> Result<Vec<String>, StaffInvitationError> {
    let mut recipients: Vec<String> = Vec::with_capacity(raw.len());
    for address in raw {
        let email = normalize_email(address)
            .ok_or_else(|| StaffInvitationError::InvalidEmail(address.clone()))?;
        if !recipients.contains(&email) {
            recipients.push(email);
        }
    }
    Ok(recipients)
}

impl StaffInvitation {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: Uuid,
        creator_id: Uuid,
        code: String,
        recipients: &[String],
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, StaffInvitationError> {
        if valid_until <= valid_from {
            return Err(StaffInvitationError::InvalidValidityWindow);
        }
        let recipients = normalize_recipients(recipients)?;
        if recipients.is_empty() {
            return Err(StaffInvitationError::NoRecipients);
        }

        let mut invitation = Self {
            id,
            version: 1,
            creator_id,
            code,
            recipients,
            valid_from,
            valid_until,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            events: PendingEvents::default(),
        };

        invitation.events.record(StaffInvitationEvent::Created {
            invitation_id: id,
            creator_id,
            code: invitation.code.clone(),
            recipients: invitation.recipients.clone(),
            valid_until,
        });

        Ok(invitation)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        version: i64,
        creator_id: Uuid,
        code: String,
        recipients: Vec<String>,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version,
            creator_id,
            code,
            recipients,
            valid_from,
            valid_until,
            deleted_at,
            created_at,
            updated_at,
            events: PendingEvents::default(),
        }
    }

    /// Invite more people. Addresses already on the list are ignored; if
    /// nothing new remains, nothing is recorded.
    pub fn add_recipients(
        &mut self,
        recipients: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StaffInvitationError> {
        self.ensure_active(now)?;

        let added: Vec<String> = normalize_recipients(recipients)?
            .into_iter()
            .filter(|email| !self.recipients.contains(email))
            .collect();
        if added.is_empty() {
            return Ok(());
        }

        self.recipients.extend(added.iter().cloned());
        self.updated_at = now;

        self.events.record(StaffInvitationEvent::RecipientsAdded {
            invitation_id: self.id,
            code: self.code.clone(),
            recipients: added,
            valid_until: self.valid_until,
        });

        Ok(())
    }

    /// Soft delete.
    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<(), StaffInvitationError> {
        if self.is_deleted() {
            return Err(StaffInvitationError::Deleted);
        }

        self.deleted_at = Some(now);
        self.updated_at = now;
        self.events.record(StaffInvitationEvent::Deleted { invitation_id: self.id });
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the code can be redeemed at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_deleted() && self.valid_from <= now && now <= self.valid_until
    }

    pub fn ensure_active(&self, now: DateTime<Utc>) -> Result<(), StaffInvitationError> {
        if self.is_deleted() {
            return Err(StaffInvitationError::Deleted);
        }
        if now > self.valid_until {
            return Err(StaffInvitationError::Expired);
        }
        Ok(())
    }
}

impl Aggregate for StaffInvitation {
    type Event = StaffInvitationEvent;
    const AGGREGATE_TYPE: &'static str = "StaffInvitation";

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn drain_events(&mut self) -> Vec<StaffInvitationEvent> {
        self.events.drain()
    }
}
