use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::outbox::core::{CommandContext, Outcome};
use crate::outbox::repository::Repository;
use crate::outbox::store::AggregateStore;
use crate::ports::{Clock, GroupGetter, StudentGetter, StudentSaver};

use super::aggregate::Student;

pub struct StudentCommandHandler<S> {
    repository: Arc<Repository<Student, S>>,
    groups: Arc<dyn GroupGetter>,
    clock: Arc<dyn Clock>,
}

impl<S: AggregateStore<Student>> StudentCommandHandler<S> {
    pub fn new(
        repository: Arc<Repository<Student, S>>,
        groups: Arc<dyn GroupGetter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repository, groups, clock }
    }

    /// Move a student to an existing group.
    pub async fn change_group(&self, ctx: &CommandContext, student_id: Uuid, group_id: Uuid) -> Result<()> {
        let now = self.clock.now();
        let groups = self.groups.clone();
        self.repository
            .update(ctx, student_id, move |student| {
                Box::pin(async move {
                    match groups.get_group(group_id).await {
                        Ok(group) => {
                            student.change_group(group.id, now);
                            Outcome::Commit
                        }
                        Err(err) => Outcome::Rollback(err),
                    }
                })
            })
            .await
    }
}

#[async_trait]
impl<S: AggregateStore<Student>> StudentGetter for Repository<Student, S> {
    async fn get_student_by_email(&self, email: &str) -> Result<Student> {
        self.get_by_email(email).await
    }
}

/// The student repository is the provisioning handler's `StudentSaver`.
#[async_trait]
impl<S: AggregateStore<Student>> StudentSaver for Repository<Student, S> {
    async fn save_student(&self, ctx: &CommandContext, mut student: Student) -> Result<()> {
        self.save(ctx, &mut student).await
    }
}
