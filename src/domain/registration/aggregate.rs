use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::outbox::core::{Aggregate, Outcome, PendingEvents};
use crate::ports::CodeGenerator;
use super::errors::RegistrationError;
use super::events::RegistrationEvent;
use super::value_objects::{normalize_email, RegistrationStatus, StudentProfile, VerificationPolicy};

// ============================================================================
// Registration Aggregate - Email Verification State Machine
// ============================================================================
//
//   Started ──mark_code_sent──▶ CodeSent
//      │  ▲                        │
//      │  └──────resend_code───────┤
//      └────────verify─────────────┴──▶ Verified ──complete_as_student──▶ Completed
//
// Time and code generation are always passed in. Wrong codes and expired
// codes are reported through Outcome::CommitWithError so the attempt counter
// survives the failed call.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Registration {
    // Identity
    pub id: Uuid,
    pub version: i64,

    // Current State
    pub email: String,
    pub status: RegistrationStatus,
    pub verification_code: String,
    pub code_attempts: i32,
    pub code_expires_at: DateTime<Utc>,
    pub resend_timeout: DateTime<Utc>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    events: PendingEvents<RegistrationEvent>,
}

impl Registration {
    /// Open a registration and issue its first code.
    pub fn start(
        id: Uuid,
        email: &str,
        now: DateTime<Utc>,
        codes: &dyn CodeGenerator,
        policy: &VerificationPolicy,
    ) -> Result<Self, RegistrationError> {
        let email = normalize_email(email)
            .ok_or_else(|| RegistrationError::InvalidEmail(email.to_string()))?;

        let mut registration = Self {
            id,
            version: 1,
            email,
            status: RegistrationStatus::Started,
            verification_code: codes.generate(policy.code_length),
            code_attempts: 0,
            code_expires_at: now + policy.code_ttl,
            resend_timeout: now + policy.resend_cooldown,
            created_at: now,
            updated_at: now,
            events: PendingEvents::default(),
        };

        registration.events.record(RegistrationEvent::Started {
            registration_id: id,
            email: registration.email.clone(),
            verification_code: registration.verification_code.clone(),
            code_expires_at: registration.code_expires_at,
        });

        Ok(registration)
    }

    /// Rebuild from a stored row. No events.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        version: i64,
        email: String,
        status: RegistrationStatus,
        verification_code: String,
        code_attempts: i32,
        code_expires_at: DateTime<Utc>,
        resend_timeout: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version,
            email,
            status,
            verification_code,
            code_attempts,
            code_expires_at,
            resend_timeout,
            created_at,
            updated_at,
            events: PendingEvents::default(),
        }
    }

    /// Record that the current code was mailed. Harmless to repeat and a
    /// no-op once the code is no longer outstanding.
    pub fn mark_code_sent(&mut self, now: DateTime<Utc>) {
        if self.status == RegistrationStatus::Started {
            self.status = RegistrationStatus::CodeSent;
            self.updated_at = now;
        }
    }

    /// Check a submitted code.
    ///
    /// Returns `CommitWithError` for expired and wrong codes so the attempt
    /// counter is persisted alongside the error.
    pub fn verify(&mut self, code: &str, now: DateTime<Utc>, policy: &VerificationPolicy) -> Outcome {
        if !self.status.awaits_verification() {
            return Outcome::rollback(self.invalid_transition("verify"));
        }

        if self.code_attempts > policy.max_code_attempts {
            return Outcome::rollback(RegistrationError::AttemptsExceeded);
        }

        if now > self.code_expires_at {
            return Outcome::commit_with_error(RegistrationError::CodeExpired);
        }

        if code.trim() != self.verification_code {
            self.code_attempts += 1;
            self.updated_at = now;
            if self.code_attempts > policy.max_code_attempts {
                return Outcome::commit_with_error(RegistrationError::AttemptsExceeded);
            }
            return Outcome::commit_with_error(RegistrationError::CodeMismatch);
        }

        self.status = RegistrationStatus::Verified;
        self.updated_at = now;
        Outcome::Commit
    }

    /// Replace the code once the cooldown has elapsed. Also lifts a lockout.
    pub fn resend_code(
        &mut self,
        now: DateTime<Utc>,
        codes: &dyn CodeGenerator,
        policy: &VerificationPolicy,
    ) -> Result<(), RegistrationError> {
        if !self.status.awaits_verification() {
            return Err(self.invalid_transition("resend a code for"));
        }

        if now < self.resend_timeout {
            return Err(RegistrationError::CooldownActive);
        }

        self.verification_code = codes.generate(policy.code_length);
        self.code_attempts = 0;
        self.code_expires_at = now + policy.code_ttl;
        self.resend_timeout = now + policy.resend_cooldown;
        self.status = RegistrationStatus::Started;
        self.updated_at = now;

        self.events.record(RegistrationEvent::CodeResent {
            registration_id: self.id,
            email: self.email.clone(),
            verification_code: self.verification_code.clone(),
            code_expires_at: self.code_expires_at,
        });

        Ok(())
    }

    /// Finish a verified registration. The student itself is created by
    /// whoever consumes the resulting event.
    pub fn complete_as_student(
        &mut self,
        profile: StudentProfile,
        group_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), RegistrationError> {
        if self.status != RegistrationStatus::Verified {
            return Err(self.invalid_transition("complete"));
        }

        if !profile.is_complete() {
            return Err(RegistrationError::IncompleteProfile);
        }

        self.status = RegistrationStatus::Completed;
        self.updated_at = now;

        self.events.record(RegistrationEvent::StudentCompleted {
            registration_id: self.id,
            email: self.email.clone(),
            first_name: profile.first_name,
            last_name: profile.last_name,
            group_id,
        });

        Ok(())
    }

    pub fn is_locked_out(&self, policy: &VerificationPolicy) -> bool {
        self.code_attempts > policy.max_code_attempts
    }

    pub fn pending_events(&self) -> &PendingEvents<RegistrationEvent> {
        &self.events
    }

    fn invalid_transition(&self, action: &'static str) -> RegistrationError {
        RegistrationError::InvalidStateTransition {
            from: self.status,
            action,
        }
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Registration {
    type Event = RegistrationEvent;
    const AGGREGATE_TYPE: &'static str = "Registration";

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn drain_events(&mut self) -> Vec<RegistrationEvent> {
        self.events.drain()
    }
}
