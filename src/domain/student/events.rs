use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outbox::core::DomainEvent;

pub const STUDENT_CREATED: &str = "StudentCreated";
pub const STUDENT_GROUP_CHANGED: &str = "StudentGroupChanged";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StudentEvent {
    Created {
        student_id: Uuid,
        email: String,
        group_id: Uuid,
        registration_id: Uuid,
    },
    GroupChanged {
        student_id: Uuid,
        old_group_id: Uuid,
        new_group_id: Uuid,
    },
}

impl DomainEvent for StudentEvent {
    const STREAM: &'static str = "student";
    const EVENT_TYPES: &'static [&'static str] = &[STUDENT_CREATED, STUDENT_GROUP_CHANGED];

    fn event_type(&self) -> &'static str {
        match self {
            StudentEvent::Created { .. } => STUDENT_CREATED,
            StudentEvent::GroupChanged { .. } => STUDENT_GROUP_CHANGED,
        }
    }
}
