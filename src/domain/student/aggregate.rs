use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::registration::normalize_email;
use crate::outbox::core::{Aggregate, PendingEvents};
use super::errors::StudentError;
use super::events::StudentEvent;

// ============================================================================
// Student Aggregate
// ============================================================================
//
// Never created directly by a user command: provisioned from a completed
// registration by the student provisioning handler.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    pub version: i64,

    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub group_id: Uuid,
    pub registration_id: Uuid,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    events: PendingEvents<StudentEvent>,
}

impl Student {
    pub fn create(
        id: Uuid,
        email: &str,
        first_name: &str,
        last_name: &str,
        group_id: Uuid,
        registration_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, StudentError> {
        let email =
            normalize_email(email).ok_or_else(|| StudentError::InvalidEmail(email.to_string()))?;
        let (first_name, last_name) = (first_name.trim(), last_name.trim());
        if first_name.is_empty() || last_name.is_empty() {
            return Err(StudentError::InvalidName);
        }

        let mut student = Self {
            id,
            version: 1,
            email,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            group_id,
            registration_id,
            created_at: now,
            updated_at: now,
            events: PendingEvents::default(),
        };

        student.events.record(StudentEvent::Created {
            student_id: id,
            email: student.email.clone(),
            group_id,
            registration_id,
        });

        Ok(student)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        version: i64,
        email: String,
        first_name: String,
        last_name: String,
        group_id: Uuid,
        registration_id: Uuid,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version,
            email,
            first_name,
            last_name,
            group_id,
            registration_id,
            created_at,
            updated_at,
            events: PendingEvents::default(),
        }
    }

    /// Move to another group. Moving to the current group changes nothing.
    pub fn change_group(&mut self, group_id: Uuid, now: DateTime<Utc>) {
        if group_id == self.group_id {
            return;
        }

        let old_group_id = std::mem::replace(&mut self.group_id, group_id);
        self.updated_at = now;
        self.events.record(StudentEvent::GroupChanged {
            student_id: self.id,
            old_group_id,
            new_group_id: group_id,
        });
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Aggregate for Student {
    type Event = StudentEvent;
    const AGGREGATE_TYPE: &'static str = "Student";

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn drain_events(&mut self) -> Vec<StudentEvent> {
        self.events.drain()
    }
}
