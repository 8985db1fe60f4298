#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StudentError {
    #[error("First and last name are required")]
    InvalidName,

    #[error("Invalid student email: {0}")]
    InvalidEmail(String),

    #[error("Email {email} already belongs to the student of registration {owner}")]
    EmailTaken { email: String, owner: uuid::Uuid },
}

impl StudentError {
    pub fn code(&self) -> &'static str {
        match self {
            StudentError::InvalidName => "student.invalid_name",
            StudentError::InvalidEmail(_) => "student.invalid_email",
            StudentError::EmailTaken { .. } => "student.email_taken",
        }
    }
}
