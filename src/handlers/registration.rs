use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::registration::{Registration, RegistrationEvent};
use crate::domain::student::{Student, StudentError};
use crate::error::Error;
use crate::outbox::core::{CommandContext, EventEnvelope, Outcome};
use crate::outbox::relay::EventHandler;
use crate::outbox::repository::Repository;
use crate::outbox::store::AggregateStore;
use crate::ports::{Clock, Mail, MailSender, StudentGetter, StudentSaver};

/// Mails verification codes, then marks the registration as CodeSent.
pub struct VerificationMailHandler<S> {
    registrations: Arc<Repository<Registration, S>>,
    mailer: Arc<dyn MailSender>,
    clock: Arc<dyn Clock>,
}

impl<S: AggregateStore<Registration>> VerificationMailHandler<S> {
    pub fn new(
        registrations: Arc<Repository<Registration, S>>,
        mailer: Arc<dyn MailSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registrations,
            mailer,
            clock,
        }
    }

    async fn send_code(
        &self,
        event: &EventEnvelope<RegistrationEvent>,
        registration_id: Uuid,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.mailer
            .send(Mail {
                to_email: email.to_string(),
                subject: "Your verification code".to_string(),
                message: format!(
                    "Your verification code is {code}. It is valid until {}.",
                    expires_at.format("%Y-%m-%d %H:%M UTC")
                ),
            })
            .await?;

        let now = self.clock.now();
        self.registrations
            .update_with(&CommandContext::caused_by(event), registration_id, move |registration| {
                registration.mark_code_sent(now);
                Outcome::Commit
            })
            .await?;

        tracing::info!(registration_id = %registration_id, "Verification code mailed");
        Ok(())
    }
}

#[async_trait]
impl<S: AggregateStore<Registration>> EventHandler<RegistrationEvent> for VerificationMailHandler<S> {
    async fn handle(&self, event: &EventEnvelope<RegistrationEvent>) -> anyhow::Result<()> {
        match &event.event_data {
            RegistrationEvent::Started {
                registration_id,
                email,
                verification_code,
                code_expires_at,
            }
            | RegistrationEvent::CodeResent {
                registration_id,
                email,
                verification_code,
                code_expires_at,
            } => {
                self.send_code(event, *registration_id, email, verification_code, *code_expires_at)
                    .await
            }
            RegistrationEvent::StudentCompleted { .. } => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "verification_mail"
    }
}

/// Creates the Student for a completed registration. A replayed event hits
/// the unique constraint and is treated as already done, but only when the
/// existing student came from the same registration.
pub struct StudentProvisioningHandler {
    students: Arc<dyn StudentSaver>,
    clock: Arc<dyn Clock>,
}

impl StudentProvisioningHandler {
    pub fn new(students: Arc<dyn StudentSaver>, clock: Arc<dyn Clock>) -> Self {
        Self { students, clock }
    }
}

#[async_trait]
impl EventHandler<RegistrationEvent> for StudentProvisioningHandler {
    async fn handle(&self, event: &EventEnvelope<RegistrationEvent>) -> anyhow::Result<()> {
        let RegistrationEvent::StudentCompleted {
            registration_id,
            email,
            first_name,
            last_name,
            group_id,
        } = &event.event_data
        else {
            return Ok(());
        };

        let student = Student::create(
            Uuid::now_v7(),
            email,
            first_name,
            last_name,
            *group_id,
            *registration_id,
            self.clock.now(),
        )?;
        let student_id = student.id;

        match self
            .students
            .save_student(&CommandContext::caused_by(event), student)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    student_id = %student_id,
                    registration_id = %registration_id,
                    "Student provisioned"
                );
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                let existing = self.students.get_student_by_email(email).await?;
                if existing.registration_id != *registration_id {
                    tracing::error!(
                        registration_id = %registration_id,
                        owner = %existing.registration_id,
                        "Email already belongs to another student"
                    );
                    return Err(Error::from(StudentError::EmailTaken {
                        email: existing.email,
                        owner: existing.registration_id,
                    })
                    .into());
                }
                tracing::debug!(
                    registration_id = %registration_id,
                    "Student already provisioned"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "student_provisioning"
    }
}
