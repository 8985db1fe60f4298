use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::outbox::core::{CommandContext, Outcome};
use crate::outbox::repository::Repository;
use crate::outbox::store::AggregateStore;
use crate::ports::{Clock, CodeGenerator, GroupGetter, StudentGetter};

use super::aggregate::Registration;
use super::commands::RegistrationCommand;
use super::errors::RegistrationError;
use super::value_objects::VerificationPolicy;

// ============================================================================
// Registration Command Handler
// ============================================================================
//
// Orchestrates: Command → Repository unit of work → Aggregate → Outbox
//
// ============================================================================

pub struct RegistrationCommandHandler<S> {
    repository: Arc<Repository<Registration, S>>,
    groups: Arc<dyn GroupGetter>,
    students: Arc<dyn StudentGetter>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    policy: VerificationPolicy,
}

/// `EmailTaken` when a student provisioned from another registration owns `email`.
async fn ensure_email_unclaimed(
    students: &dyn StudentGetter,
    email: &str,
    registration_id: Uuid,
) -> Result<()> {
    match students.get_student_by_email(email).await {
        Ok(student) if student.registration_id == registration_id => Ok(()),
        Ok(_) => Err(RegistrationError::EmailTaken.into()),
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err),
    }
}

impl<S: AggregateStore<Registration>> RegistrationCommandHandler<S> {
    pub fn new(
        repository: Arc<Repository<Registration, S>>,
        groups: Arc<dyn GroupGetter>,
        students: Arc<dyn StudentGetter>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            repository,
            groups,
            students,
            clock,
            codes,
            policy,
        }
    }

    pub fn repository(&self) -> &Arc<Repository<Registration, S>> {
        &self.repository
    }

    /// Handle a command and persist the result. Returns the registration id.
    pub async fn handle(&self, ctx: &CommandContext, command: RegistrationCommand) -> Result<Uuid> {
        let registration_id = command.registration_id();
        let now = self.clock.now();
        let policy = self.policy;

        tracing::debug!(
            registration_id = %registration_id,
            command = command.name(),
            correlation_id = %ctx.correlation_id,
            "Handling registration command"
        );

        match command {
            RegistrationCommand::Start { email, .. } => {
                let mut registration =
                    Registration::start(registration_id, &email, now, self.codes.as_ref(), &policy)?;
                ensure_email_unclaimed(self.students.as_ref(), &registration.email, registration_id).await?;
                self.repository.save(ctx, &mut registration).await?;
            }

            RegistrationCommand::MarkCodeSent { .. } => {
                self.repository
                    .update_with(ctx, registration_id, move |registration| {
                        registration.mark_code_sent(now);
                        Outcome::Commit
                    })
                    .await?;
            }

            RegistrationCommand::Verify { code, .. } => {
                self.repository
                    .update_with(ctx, registration_id, move |registration| {
                        registration.verify(&code, now, &policy)
                    })
                    .await?;
            }

            RegistrationCommand::ResendCode { .. } => {
                let codes = self.codes.clone();
                self.repository
                    .update_with(ctx, registration_id, move |registration| {
                        registration.resend_code(now, codes.as_ref(), &policy).into()
                    })
                    .await?;
            }

            RegistrationCommand::CompleteAsStudent { profile, group_id, .. } => {
                let groups = self.groups.clone();
                let students = self.students.clone();
                self.repository
                    .update(ctx, registration_id, move |registration| {
                        Box::pin(async move {
                            // Resolved under the row lock so a concurrent
                            // completion cannot pick a different group.
                            let group = match groups.get_group(group_id).await {
                                Ok(group) => group,
                                Err(err) => return Outcome::Rollback(err),
                            };
                            let email = registration.email.clone();
                            if let Err(err) =
                                ensure_email_unclaimed(students.as_ref(), &email, registration_id).await
                            {
                                return Outcome::Rollback(err);
                            }
                            registration.complete_as_student(profile, group.id, now).into()
                        })
                    })
                    .await?;
            }
        }

        Ok(registration_id)
    }
}
