use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::staff_invitation::StaffInvitationEvent;
use crate::outbox::core::EventEnvelope;
use crate::outbox::relay::EventHandler;
use crate::ports::{Mail, MailSender, UserGetter};

fn invitation_mail(to_email: &str, code: &str, valid_until: DateTime<Utc>) -> Mail {
    Mail {
        to_email: to_email.to_string(),
        subject: "You have been invited to join the staff".to_string(),
        message: format!(
            "Use the invitation code {code} to create your staff account before {}.",
            valid_until.format("%Y-%m-%d")
        ),
    }
}

/// Mails the invitation code to every new recipient.
pub struct InvitationMailHandler {
    mailer: Arc<dyn MailSender>,
}

impl InvitationMailHandler {
    pub fn new(mailer: Arc<dyn MailSender>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl EventHandler<StaffInvitationEvent> for InvitationMailHandler {
    async fn handle(&self, event: &EventEnvelope<StaffInvitationEvent>) -> anyhow::Result<()> {
        let (code, recipients, valid_until) = match &event.event_data {
            StaffInvitationEvent::Created { code, recipients, valid_until, .. }
            | StaffInvitationEvent::RecipientsAdded { code, recipients, valid_until, .. } => {
                (code, recipients, *valid_until)
            }
            StaffInvitationEvent::Deleted { .. } => return Ok(()),
        };

        for recipient in recipients {
            self.mailer
                .send(invitation_mail(recipient, code, valid_until))
                .await?;
        }
        tracing::info!(
            invitation_id = %event.aggregate_id,
            recipient_count = recipients.len(),
            "Invitation mails sent"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "invitation_mail"
    }
}

/// Tells the creator an invitation went out.
pub struct InvitationReceiptHandler {
    users: Arc<dyn UserGetter>,
    mailer: Arc<dyn MailSender>,
}

impl InvitationReceiptHandler {
    pub fn new(users: Arc<dyn UserGetter>, mailer: Arc<dyn MailSender>) -> Self {
        Self { users, mailer }
    }
}

#[async_trait]
impl EventHandler<StaffInvitationEvent> for InvitationReceiptHandler {
    async fn handle(&self, event: &EventEnvelope<StaffInvitationEvent>) -> anyhow::Result<()> {
        let StaffInvitationEvent::Created { creator_id, code, recipients, .. } = &event.event_data
        else {
            return Ok(());
        };

        let creator = self.users.get_user(*creator_id).await?;
        self.mailer
            .send(Mail {
                to_email: creator.email,
                subject: "Staff invitation sent".to_string(),
                message: format!(
                    "Invitation {code} was sent to: {}.",
                    recipients.join(", ")
                ),
            })
            .await
    }

    fn name(&self) -> &'static str {
        "invitation_receipt"
    }
}
