use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgConnection, Row};

use crate::error::Result;
use crate::outbox::repository::Repository;
use crate::outbox::store::{AggregateStore, Lookup, MemoryRecord, PgRecord};

use super::aggregate::Registration;
use super::value_objects::{normalize_email, RegistrationStatus};

// ============================================================================
// Registration Persistence - row mapping for both backends
// ============================================================================

#[async_trait]
impl PgRecord for Registration {
    const TABLE: &'static str = "registrations";
    const COLUMNS: &'static str = "id, email, status, verification_code, code_attempts, \
        code_expires_at, resend_timeout, version, created_at, updated_at";

    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<RegistrationStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Registration::restore(
            row.try_get("id")?,
            row.try_get("version")?,
            row.try_get("email")?,
            status,
            row.try_get("verification_code")?,
            row.try_get("code_attempts")?,
            row.try_get("code_expires_at")?,
            row.try_get("resend_timeout")?,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }

    async fn insert(&self, conn: &mut PgConnection) -> std::result::Result<PgQueryResult, sqlx::Error> {
        sqlx::query(
            "INSERT INTO registrations (
                id, email, status, verification_code, code_attempts,
                code_expires_at, resend_timeout, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(self.id)
        .bind(&self.email)
        .bind(self.status.as_str())
        .bind(&self.verification_code)
        .bind(self.code_attempts)
        .bind(self.code_expires_at)
        .bind(self.resend_timeout)
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(conn)
        .await
    }

    async fn update(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> std::result::Result<PgQueryResult, sqlx::Error> {
        sqlx::query(
            "UPDATE registrations
             SET status = $2, verification_code = $3, code_attempts = $4,
                 code_expires_at = $5, resend_timeout = $6, version = $7, updated_at = $8
             WHERE id = $1 AND version = $9",
        )
        .bind(self.id)
        .bind(self.status.as_str())
        .bind(&self.verification_code)
        .bind(self.code_attempts)
        .bind(self.code_expires_at)
        .bind(self.resend_timeout)
        .bind(self.version)
        .bind(self.updated_at)
        .bind(expected_version)
        .execute(conn)
        .await
    }
}

impl MemoryRecord for Registration {
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        // Only open registrations reserve their address.
        if self.status == RegistrationStatus::Completed {
            Vec::new()
        } else {
            vec![("email", self.email.clone())]
        }
    }

    fn field(&self, column: &str) -> Option<String> {
        match column {
            "email" => Some(self.email.clone()),
            _ => None,
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl<S: AggregateStore<Registration>> Repository<Registration, S> {
    /// Most recent registration for an address, matched case-insensitively.
    pub async fn get_by_email(&self, email: &str) -> Result<Registration> {
        let email = normalize_email(email).unwrap_or_else(|| email.trim().to_lowercase());
        self.find_one(&Lookup::field("email", email)).await
    }
}
