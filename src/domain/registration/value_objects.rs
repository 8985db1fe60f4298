use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Registration Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Started,
    CodeSent,
    Verified,
    Completed,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Started => "Started",
            RegistrationStatus::CodeSent => "CodeSent",
            RegistrationStatus::Verified => "Verified",
            RegistrationStatus::Completed => "Completed",
        }
    }

    /// Statuses in which a verification code is outstanding.
    pub fn awaits_verification(&self) -> bool {
        matches!(self, RegistrationStatus::Started | RegistrationStatus::CodeSent)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Started" => Ok(RegistrationStatus::Started),
            "CodeSent" => Ok(RegistrationStatus::CodeSent),
            "Verified" => Ok(RegistrationStatus::Verified),
            "Completed" => Ok(RegistrationStatus::Completed),
            other => Err(format!("unknown registration status: {other}")),
        }
    }
}

/// Knobs of the email verification flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPolicy {
    pub code_length: usize,
    pub code_ttl: Duration,
    pub resend_cooldown: Duration,
    /// Wrong codes tolerated before lockout.
    pub max_code_attempts: i32,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            code_length: 6,
            code_ttl: Duration::minutes(15),
            resend_cooldown: Duration::seconds(60),
            max_code_attempts: 3,
        }
    }
}

/// Personal data supplied when a verified registration becomes a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub first_name: String,
    pub last_name: String,
}

impl StudentProfile {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into().trim().to_string(),
            last_name: last_name.into().trim().to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.first_name.is_empty() && !self.last_name.is_empty()
    }
}

/// Lower-cased, trimmed address, or `None` if it does not look like one.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let well_formed = !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace);
    well_formed.then_some(email)
}
