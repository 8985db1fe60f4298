use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgConnection, Row};

use crate::domain::registration::normalize_email;
use crate::error::Result;
use crate::outbox::repository::Repository;
use crate::outbox::store::{AggregateStore, Lookup, MemoryRecord, PgRecord};

use super::aggregate::Student;

#[async_trait]
impl PgRecord for Student {
    const TABLE: &'static str = "students";
    const COLUMNS: &'static str = "id, email, first_name, last_name, group_id, registration_id, \
        version, created_at, updated_at";

    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Student::restore(
            row.try_get("id")?,
            row.try_get("version")?,
            row.try_get("email")?,
            row.try_get("first_name")?,
            row.try_get("last_name")?,
            row.try_get("group_id")?,
            row.try_get("registration_id")?,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }

    async fn insert(&self, conn: &mut PgConnection) -> std::result::Result<PgQueryResult, sqlx::Error> {
        sqlx::query(
            "INSERT INTO students (
                id, email, first_name, last_name, group_id, registration_id,
                version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(self.id)
        .bind(&self.email)
        .bind(&self.first_name)
        .bind(&self.last_name)
        .bind(self.group_id)
        .bind(self.registration_id)
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
            "UPDATE students
             SET first_name = $2, last_name = $3, group_id = $4, version = $5, updated_at = $6
             WHERE id = $1 AND version = $7",
        )
        .bind(self.id)
        .bind(&self.first_name)
        .bind(&self.last_name)
        .bind(self.group_id)
        .bind(self.version)
        .bind(self.updated_at)
        .bind(expected_version)
        .execute(conn)
        .await
    }
}

impl MemoryRecord for Student {
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            ("email", self.email.clone()),
            ("registration_id", self.registration_id.to_string()),
        ]
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

impl<S: AggregateStore<Student>> Repository<Student, S> {
    pub async fn get_by_email(&self, email: &str) -> Result<Student> {
        let email = normalize_email(email).unwrap_or_else(|| email.trim().to_lowercase());
        self.find_one(&Lookup::field("email", email)).await
    }
}
