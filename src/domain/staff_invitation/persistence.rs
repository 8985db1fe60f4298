use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgConnection, Row};

use crate::error::{Error, Result};
use crate::outbox::core::Aggregate;
use crate::outbox::repository::Repository;
use crate::outbox::store::{AggregateStore, Lookup, MemoryRecord, PgRecord};

use super::aggregate::StaffInvitation;

#[async_trait]
impl PgRecord for StaffInvitation {
    const TABLE: &'static str = "staff_invitations";
    const COLUMNS: &'static str = "id, creator_id, code, recipients, valid_from, valid_until, \
        deleted_at, version, created_at, updated_at";

    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StaffInvitation::restore(
            row.try_get("id")?,
            row.try_get("version")?,
            row.try_get("creator_id")?,
            row.try_get("code")?,
            row.try_get("recipients")?,
            row.try_get("valid_from")?,
            row.try_get("valid_until")?,
            row.try_get("deleted_at")?,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }

    async fn insert(&self, conn: &mut PgConnection) -> std::result::Result<PgQueryResult, sqlx::Error> {
        sqlx::query(
            "INSERT INTO staff_invitations (
                id, creator_id, code, recipients, valid_from, valid_until,
                deleted_at, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(self.id)
        .bind(self.creator_id)
        .bind(&self.code)
        .bind(&self.recipients)
        .bind(self.valid_from)
        .bind(self.valid_until)
        .bind(self.deleted_at)
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
            "UPDATE staff_invitations
             SET recipients = $2, valid_until = $3, deleted_at = $4, version = $5, updated_at = $6
             WHERE id = $1 AND version = $7",
        )
        .bind(self.id)
        .bind(&self.recipients)
        .bind(self.valid_until)
        .bind(self.deleted_at)
        .bind(self.version)
        .bind(self.updated_at)
        .bind(expected_version)
        .execute(conn)
        .await
    }
}

impl MemoryRecord for StaffInvitation {
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("code", self.code.clone())]
    }

    fn field(&self, column: &str) -> Option<String> {
        match column {
            "code" => Some(self.code.clone()),
            _ => None,
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl<S: AggregateStore<StaffInvitation>> Repository<StaffInvitation, S> {
    /// Live invitation by code. Deleted invitations are `NotFound`.
    pub async fn get_by_code(&self, code: &str) -> Result<StaffInvitation> {
        let invitation = self.find_one(&Lookup::field("code", code.trim())).await?;
        if invitation.is_deleted() {
            return Err(Error::not_found(StaffInvitation::AGGREGATE_TYPE));
        }
        Ok(invitation)
    }
}
