use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::identity::{DbUser, Identity};
use crate::utils::utc_now;

/// Narrow read/write contract over identity persistence. The authorization
/// core never touches user tables directly.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Identity by stable external id, with role memberships hydrated.
    async fn get_identity(&self, uuid: Uuid) -> Result<Option<Identity>, AppError>;

    /// Identity plus password hash, for the login flow only.
    async fn get_identity_by_username(
        &self,
        username: &str,
    ) -> Result<Option<(Identity, String)>, AppError>;

    /// Permission tags granted to the given roles through menu assignments
    /// (static-role enforcement mode).
    async fn role_permission_tags(&self, role_ids: &HashSet<i64>) -> Result<HashSet<String>, AppError>;

    /// Menu node ids reachable through the given roles (tree resolver input).
    async fn authorized_menu_ids(&self, role_ids: &HashSet<i64>) -> Result<HashSet<i64>, AppError>;

    async fn touch_last_login(&self, user_id: i64) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct SqlCredentialStore {
    pool: SqlitePool,
}

impl SqlCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn role_ids(&self, user_id: i64) -> Result<HashSet<i64>, AppError> {
        let rows = sqlx::query("SELECT role_id FROM sys_user_role WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get::<i64, _>("role_id")).collect())
    }
}

const USER_COLUMNS: &str = "id, uuid, username, nickname, password_hash, is_superuser, is_staff, \
                            enabled, multi_login, created_at, last_login_at";

#[async_trait]
impl CredentialStore for SqlCredentialStore {
    async fn get_identity(&self, uuid: Uuid) -> Result<Option<Identity>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM sys_user WHERE uuid = ?");
        let user = sqlx::query_as::<_, DbUser>(&sql)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;

        match user {
            Some(user) => {
                let roles = self.role_ids(user.id).await?;
                Ok(Some(user.into_identity(roles)))
            }
            None => Ok(None),
        }
    }

    async fn get_identity_by_username(
        &self,
        username: &str,
    ) -> Result<Option<(Identity, String)>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM sys_user WHERE username = ?");
        let user = sqlx::query_as::<_, DbUser>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        match user {
            Some(user) => {
                let roles = self.role_ids(user.id).await?;
                let password_hash = user.password_hash.clone();
                Ok(Some((user.into_identity(roles), password_hash)))
            }
            None => Ok(None),
        }
    }

    async fn role_permission_tags(
        &self,
        role_ids: &HashSet<i64>,
    ) -> Result<HashSet<String>, AppError> {
        if role_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; role_ids.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT m.perms FROM sys_menu m \
             INNER JOIN sys_role_menu rm ON m.id = rm.menu_id \
             INNER JOIN sys_role r ON r.id = rm.role_id \
             WHERE rm.role_id IN ({placeholders}) \
               AND r.enabled = 1 AND m.status = 1 AND m.perms IS NOT NULL"
        );

        let mut query = sqlx::query(&sql);
        for role_id in role_ids {
            query = query.bind(role_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("perms")).collect())
    }

    async fn authorized_menu_ids(&self, role_ids: &HashSet<i64>) -> Result<HashSet<i64>, AppError> {
        if role_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; role_ids.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT rm.menu_id FROM sys_role_menu rm \
             INNER JOIN sys_role r ON r.id = rm.role_id \
             WHERE rm.role_id IN ({placeholders}) AND r.enabled = 1"
        );

        let mut query = sqlx::query(&sql);
        for role_id in role_ids {
            query = query.bind(role_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get::<i64, _>("menu_id")).collect())
    }

    async fn touch_last_login(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE sys_user SET last_login_at = ? WHERE id = ?")
            .bind(utc_now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
