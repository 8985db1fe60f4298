use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::student::Student;
use crate::error::Result;
use crate::outbox::core::CommandContext;

// ============================================================================
// Ports - Narrow Capabilities Consumed by the Core
// ============================================================================
//
// Each consumer depends on the smallest trait it needs. Adapters live in
// crate::adapters; tests supply their own.
//
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub trait CodeGenerator: Send + Sync {
    /// A fresh numeric code of exactly `length` digits.
    fn generate(&self, length: usize) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to_email: String,
    pub subject: String,
    pub message: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: Mail) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
}

#[async_trait]
pub trait GroupGetter: Send + Sync {
    /// `NotFound` when no such group exists.
    async fn get_group(&self, id: Uuid) -> Result<Group>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

impl User {
    pub fn is_staff(&self) -> bool {
        matches!(self.role.as_str(), "staff" | "admin")
    }
}

#[async_trait]
pub trait UserGetter: Send + Sync {
    /// `NotFound` when no such user exists.
    async fn get_user(&self, id: Uuid) -> Result<User>;
}

#[async_trait]
pub trait StudentGetter: Send + Sync {
    /// `NotFound` when no student owns the email.
    async fn get_student_by_email(&self, email: &str) -> Result<Student>;
}

#[async_trait]
pub trait StudentSaver: StudentGetter {
    /// `Conflict` when a student with the same email or registration exists.
    async fn save_student(&self, ctx: &CommandContext, student: Student) -> Result<()>;
}
