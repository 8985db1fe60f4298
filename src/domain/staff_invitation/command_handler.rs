use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::outbox::core::CommandContext;
use crate::outbox::repository::Repository;
use crate::outbox::store::AggregateStore;
use crate::ports::{Clock, CodeGenerator, UserGetter};

use super::aggregate::StaffInvitation;
use super::commands::StaffInvitationCommand;
use super::errors::StaffInvitationError;

pub const INVITATION_CODE_LENGTH: usize = 10;

// ============================================================================
// Staff Invitation Command Handler
// ============================================================================

pub struct StaffInvitationCommandHandler<S> {
    repository: Arc<Repository<StaffInvitation, S>>,
    users: Arc<dyn UserGetter>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    validity: Duration,
}

impl<S: AggregateStore<StaffInvitation>> StaffInvitationCommandHandler<S> {
    pub fn new(
        repository: Arc<Repository<StaffInvitation, S>>,
        users: Arc<dyn UserGetter>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
    ) -> Self {
        Self {
            repository,
            users,
            clock,
            codes,
            validity: Duration::days(7),
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub async fn handle(&self, ctx: &CommandContext, command: StaffInvitationCommand) -> Result<Uuid> {
        let invitation_id = command.invitation_id();
        let now = self.clock.now();

        match command {
            StaffInvitationCommand::Create { creator_id, recipients, valid_until, .. } => {
                let creator = self.users.get_user(creator_id).await?;
                if !creator.is_staff() {
                    return Err(StaffInvitationError::CreatorNotStaff.into());
                }

                let mut invitation = StaffInvitation::create(
                    invitation_id,
                    creator_id,
                    self.codes.generate(INVITATION_CODE_LENGTH),
                    &recipients,
                    now,
                    valid_until.unwrap_or(now + self.validity),
                    now,
                )?;
                self.repository.save(ctx, &mut invitation).await?;
                tracing::info!(
                    invitation_id = %invitation_id,
                    creator_id = %creator_id,
                    recipient_count = recipients.len(),
                    "Staff invitation created"
                );
            }

            StaffInvitationCommand::AddRecipients { recipients, .. } => {
                self.repository
                    .update_with(ctx, invitation_id, move |invitation| {
                        invitation.add_recipients(&recipients, now).into()
                    })
                    .await?;
            }

            StaffInvitationCommand::Delete { .. } => {
                self.repository
                    .update_with(ctx, invitation_id, move |invitation| {
                        invitation.delete(now).into()
                    })
                    .await?;
            }
        }

        Ok(invitation_id)
    }
}
