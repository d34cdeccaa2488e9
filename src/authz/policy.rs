use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use utoipa::ToSchema;

use crate::errors::AppError;

/// A grant: `subject` may perform `action` on paths matching `object`.
/// Subjects are user uuids or `role:{id}` strings; `object` is an exact path
/// or a trailing `/*` prefix pattern; `action` is an HTTP verb or `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct PolicyRule {
    #[schema(example = "role:2")]
    pub subject: String,
    #[schema(example = "/sys/users/*")]
    pub object: String,
    #[schema(example = "DELETE")]
    pub action: String,
}

/// A membership edge: `member` belongs to `group`. Closure over these edges
/// yields the subject's effective group set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct GroupRule {
    pub member: String,
    pub group: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RuleFilter {
    pub subject: Option<String>,
    pub object: Option<String>,
}

/// Persistence contract for permission and group rules. Storage is dumb;
/// cache invalidation is the engine's job.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Returns false when the rule already existed.
    async fn add_rule(&self, rule: &PolicyRule) -> Result<bool, AppError>;
    async fn add_rules(&self, rules: &[PolicyRule]) -> Result<usize, AppError>;
    async fn remove_rule(&self, rule: &PolicyRule) -> Result<bool, AppError>;
    async fn remove_rules(&self, rules: &[PolicyRule]) -> Result<usize, AppError>;
    async fn remove_rules_for_subject(&self, subject: &str) -> Result<usize, AppError>;
    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<PolicyRule>, AppError>;

    async fn add_group_rule(&self, rule: &GroupRule) -> Result<bool, AppError>;
    async fn add_group_rules(&self, rules: &[GroupRule]) -> Result<usize, AppError>;
    async fn remove_group_rule(&self, rule: &GroupRule) -> Result<bool, AppError>;
    async fn remove_group_rules_for_member(&self, member: &str) -> Result<usize, AppError>;
    async fn list_group_rules(&self, member: Option<&str>) -> Result<Vec<GroupRule>, AppError>;
}

/// Rules in the shared `sys_policy_rule` table: ptype 'p' for permission
/// rules, 'g' for group edges.
#[derive(Debug, Clone)]
pub struct SqlPolicyStore {
    pool: SqlitePool,
}

impl SqlPolicyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for SqlPolicyStore {
    async fn add_rule(&self, rule: &PolicyRule) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sys_policy_rule (ptype, v0, v1, v2) VALUES ('p', ?, ?, ?)",
        )
        .bind(&rule.subject)
        .bind(&rule.object)
        .bind(&rule.action)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_rules(&self, rules: &[PolicyRule]) -> Result<usize, AppError> {
        let mut added = 0;
        for rule in rules {
            if self.add_rule(rule).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    async fn remove_rule(&self, rule: &PolicyRule) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM sys_policy_rule WHERE ptype = 'p' AND v0 = ? AND v1 = ? AND v2 = ?",
        )
        .bind(&rule.subject)
        .bind(&rule.object)
        .bind(&rule.action)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_rules(&self, rules: &[PolicyRule]) -> Result<usize, AppError> {
        let mut removed = 0;
        for rule in rules {
            if self.remove_rule(rule).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn remove_rules_for_subject(&self, subject: &str) -> Result<usize, AppError> {
        let result = sqlx::query("DELETE FROM sys_policy_rule WHERE ptype = 'p' AND v0 = ?")
            .bind(subject)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<PolicyRule>, AppError> {
        let mut sql = String::from("SELECT v0, v1, v2 FROM sys_policy_rule WHERE ptype = 'p'");
        if filter.subject.is_some() {
            sql.push_str(" AND v0 = ?");
        }
        if filter.object.is_some() {
            sql.push_str(" AND v1 = ?");
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql);
        if let Some(subject) = &filter.subject {
            query = query.bind(subject);
        }
        if let Some(object) = &filter.object {
            query = query.bind(object);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| PolicyRule {
                subject: row.get("v0"),
                object: row.get("v1"),
                action: row.get("v2"),
            })
            .collect())
    }

    async fn add_group_rule(&self, rule: &GroupRule) -> Result<bool, AppError> {
        // v2 is '' rather than NULL: SQLite unique indexes treat NULLs as
        // distinct, which would let duplicate edges through.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sys_policy_rule (ptype, v0, v1, v2) VALUES ('g', ?, ?, '')",
        )
        .bind(&rule.member)
        .bind(&rule.group)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_group_rules(&self, rules: &[GroupRule]) -> Result<usize, AppError> {
        let mut added = 0;
        for rule in rules {
            if self.add_group_rule(rule).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    async fn remove_group_rule(&self, rule: &GroupRule) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM sys_policy_rule WHERE ptype = 'g' AND v0 = ? AND v1 = ?")
                .bind(&rule.member)
                .bind(&rule.group)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_group_rules_for_member(&self, member: &str) -> Result<usize, AppError> {
        let result = sqlx::query("DELETE FROM sys_policy_rule WHERE ptype = 'g' AND v0 = ?")
            .bind(member)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn list_group_rules(&self, member: Option<&str>) -> Result<Vec<GroupRule>, AppError> {
        let mut sql = String::from("SELECT v0, v1 FROM sys_policy_rule WHERE ptype = 'g'");
        if member.is_some() {
            sql.push_str(" AND v0 = ?");
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql);
        if let Some(member) = member {
            query = query.bind(member);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| GroupRule {
                member: row.get("v0"),
                group: row.get("v1"),
            })
            .collect())
    }
}

/// In-memory rule sets, used by unit tests and available as a storage-free
/// deployment option.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    rules: Mutex<HashSet<PolicyRule>>,
    group_rules: Mutex<HashSet<GroupRule>>,
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn add_rule(&self, rule: &PolicyRule) -> Result<bool, AppError> {
        Ok(self.rules.lock().unwrap().insert(rule.clone()))
    }

    async fn add_rules(&self, rules: &[PolicyRule]) -> Result<usize, AppError> {
        let mut set = self.rules.lock().unwrap();
        Ok(rules.iter().filter(|r| set.insert((*r).clone())).count())
    }

    async fn remove_rule(&self, rule: &PolicyRule) -> Result<bool, AppError> {
        Ok(self.rules.lock().unwrap().remove(rule))
    }

    async fn remove_rules(&self, rules: &[PolicyRule]) -> Result<usize, AppError> {
        let mut set = self.rules.lock().unwrap();
        Ok(rules.iter().filter(|r| set.remove(*r)).count())
    }

    async fn remove_rules_for_subject(&self, subject: &str) -> Result<usize, AppError> {
        let mut set = self.rules.lock().unwrap();
        let before = set.len();
        set.retain(|r| r.subject != subject);
        Ok(before - set.len())
    }

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<PolicyRule>, AppError> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                filter.subject.as_deref().map_or(true, |s| r.subject == s)
                    && filter.object.as_deref().map_or(true, |o| r.object == o)
            })
            .cloned()
            .collect())
    }

    async fn add_group_rule(&self, rule: &GroupRule) -> Result<bool, AppError> {
        Ok(self.group_rules.lock().unwrap().insert(rule.clone()))
    }

    async fn add_group_rules(&self, rules: &[GroupRule]) -> Result<usize, AppError> {
        let mut set = self.group_rules.lock().unwrap();
        Ok(rules.iter().filter(|r| set.insert((*r).clone())).count())
    }

    async fn remove_group_rule(&self, rule: &GroupRule) -> Result<bool, AppError> {
        Ok(self.group_rules.lock().unwrap().remove(rule))
    }

    async fn remove_group_rules_for_member(&self, member: &str) -> Result<usize, AppError> {
        let mut set = self.group_rules.lock().unwrap();
        let before = set.len();
        set.retain(|r| r.member != member);
        Ok(before - set.len())
    }

    async fn list_group_rules(&self, member: Option<&str>) -> Result<Vec<GroupRule>, AppError> {
        Ok(self
            .group_rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| member.map_or(true, |m| r.member == m))
            .cloned()
            .collect())
    }
}
