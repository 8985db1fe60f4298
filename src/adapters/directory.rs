use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ports::{Group, GroupGetter, User, UserGetter};

// ============================================================================
// Directory - read-only group and user lookups
// ============================================================================

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_group(&self, name: &str) -> Result<Group> {
        let group = Group {
            id: Uuid::now_v7(),
            name: name.to_string(),
        };
        sqlx::query("INSERT INTO groups (id, name) VALUES ($1, $2)")
            .bind(group.id)
            .bind(&group.name)
            .execute(&self.pool)
            .await?;
        Ok(group)
    }
}

#[async_trait]
impl GroupGetter for PgDirectory {
    async fn get_group(&self, id: Uuid) -> Result<Group> {
        let row = sqlx::query("SELECT id, name FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Group"))?;

        Ok(Group {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    }
}

#[async_trait]
impl UserGetter for PgDirectory {
    async fn get_user(&self, id: Uuid) -> Result<User> {
        let row = sqlx::query("SELECT id, email, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("User"))?;

        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            role: row.try_get("role")?,
        })
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    groups: RwLock<HashMap<Uuid, Group>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_group(&self, name: &str) -> Group {
        let group = Group {
            id: Uuid::now_v7(),
            name: name.to_string(),
        };
        self.groups.write().await.insert(group.id, group.clone());
        group
    }

    pub async fn add_user(&self, email: &str, role: &str) -> User {
        let user = User {
            id: Uuid::now_v7(),
            email: email.to_lowercase(),
            role: role.to_string(),
        };
        self.users.write().await.insert(user.id, user.clone());
        user
    }
}

#[async_trait]
impl GroupGetter for InMemoryDirectory {
    async fn get_group(&self, id: Uuid) -> Result<Group> {
        self.groups
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("Group"))
    }
}

#[async_trait]
impl UserGetter for InMemoryDirectory {
    async fn get_user(&self, id: Uuid) -> Result<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("User"))
    }
}
