use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::student::StudentEvent;
use crate::outbox::core::EventEnvelope;
use crate::outbox::relay::EventHandler;
use crate::ports::{GroupGetter, Mail, MailSender};

/// Welcomes a new student and tells them their group.
pub struct WelcomeMailHandler {
    groups: Arc<dyn GroupGetter>,
    mailer: Arc<dyn MailSender>,
}

impl WelcomeMailHandler {
    pub fn new(groups: Arc<dyn GroupGetter>, mailer: Arc<dyn MailSender>) -> Self {
        Self { groups, mailer }
    }
}

#[async_trait]
impl EventHandler<StudentEvent> for WelcomeMailHandler {
    async fn handle(&self, event: &EventEnvelope<StudentEvent>) -> anyhow::Result<()> {
        let StudentEvent::Created { email, group_id, .. } = &event.event_data else {
            return Ok(());
        };

        let group = self.groups.get_group(*group_id).await?;
        self.mailer
            .send(Mail {
                to_email: email.clone(),
                subject: "Welcome!".to_string(),
                message: format!("Your registration is complete. You are in group {}.", group.name),
            })
            .await
    }

    fn name(&self) -> &'static str {
        "welcome_mail"
    }
}
