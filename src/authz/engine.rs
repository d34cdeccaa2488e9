use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::policy::{GroupRule, PolicyRule, PolicyStore, RuleFilter};
use super::PermissionChecker;
use crate::errors::AppError;
use crate::models::identity::{role_subject, Identity};

/// Compiled, read-optimized view of the rule sets: subject-indexed grants and
/// member-indexed group adjacency.
#[derive(Debug, Default)]
struct CompiledPolicy {
    grants: HashMap<String, Vec<(String, String)>>,
    groups: HashMap<String, Vec<String>>,
}

impl CompiledPolicy {
    fn compile(rules: Vec<PolicyRule>, group_rules: Vec<GroupRule>) -> Self {
        let mut grants: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for rule in rules {
            grants
                .entry(rule.subject)
                .or_default()
                .push((rule.object, rule.action));
        }

        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for rule in group_rules {
            groups.entry(rule.member).or_default().push(rule.group);
        }

        Self { grants, groups }
    }

    /// All groups reachable from the seed subjects. BFS with a visited set,
    /// so membership cycles terminate.
    fn transitive_groups(&self, seeds: &[String]) -> HashSet<String> {
        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        let mut queue: VecDeque<&str> = seeds.iter().map(String::as_str).collect();

        while let Some(subject) = queue.pop_front() {
            if let Some(parents) = self.groups.get(subject) {
                for group in parents {
                    if visited.insert(group.clone()) {
                        queue.push_back(group);
                    }
                }
            }
        }

        visited
    }

    fn any_grant_matches(&self, subjects: &HashSet<String>, object: &str, action: &str) -> bool {
        subjects.iter().any(|subject| {
            self.grants.get(subject).is_some_and(|grants| {
                grants.iter().any(|(pattern, granted_action)| {
                    object_matches(pattern, object) && action_matches(granted_action, action)
                })
            })
        })
    }
}

/// Exact match, or a trailing `/*` pattern matching the prefix path itself
/// and anything below it.
fn object_matches(pattern: &str, object: &str) -> bool {
    if pattern == object {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return object == prefix || object.starts_with(&pattern[..pattern.len() - 1]);
    }
    false
}

fn action_matches(granted: &str, requested: &str) -> bool {
    granted == "*" || granted.eq_ignore_ascii_case(requested)
}

/// Owns the derived policy cache and fronts every rule mutation, so the
/// compiled view can never lag behind the source-of-truth store.
pub struct PolicyEngine {
    store: Arc<dyn PolicyStore>,
    cache: RwLock<Option<Arc<CompiledPolicy>>>,
    store_timeout: Duration,
}

impl PolicyEngine {
    pub fn new(store: Arc<dyn PolicyStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
            store_timeout,
        }
    }

    /// Drops the compiled view. The next `authorize` rebuilds lazily, so bulk
    /// edits do not trigger a rebuild per mutation.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        tracing::debug!("policy cache invalidated");
    }

    async fn snapshot(&self) -> Result<Arc<CompiledPolicy>, AppError> {
        if let Some(compiled) = self.cache.read().await.as_ref() {
            return Ok(compiled.clone());
        }

        let mut slot = self.cache.write().await;
        // Another worker may have rebuilt while we waited for the write lock.
        if let Some(compiled) = slot.as_ref() {
            return Ok(compiled.clone());
        }

        let rules = self
            .timed(self.store.list_rules(&RuleFilter::default()))
            .await?;
        let group_rules = self.timed(self.store.list_group_rules(None)).await?;

        let compiled = Arc::new(CompiledPolicy::compile(rules, group_rules));
        *slot = Some(compiled.clone());
        tracing::debug!(
            subjects = compiled.grants.len(),
            members = compiled.groups.len(),
            "policy cache rebuilt"
        );

        Ok(compiled)
    }

    async fn timed<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| AppError::PolicyStoreUnavailable("policy store timed out".into()))?
    }

    // Mutations write the store first, then drop the cache before returning,
    // so the next authorize call on any worker observes the change.

    pub async fn add_rule(&self, rule: &PolicyRule) -> Result<bool, AppError> {
        let added = self.timed(self.store.add_rule(rule)).await?;
        self.invalidate().await;
        Ok(added)
    }

    pub async fn add_rules(&self, rules: &[PolicyRule]) -> Result<usize, AppError> {
        let added = self.timed(self.store.add_rules(rules)).await?;
        self.invalidate().await;
        Ok(added)
    }

    pub async fn remove_rule(&self, rule: &PolicyRule) -> Result<bool, AppError> {
        let removed = self.timed(self.store.remove_rule(rule)).await?;
        self.invalidate().await;
        Ok(removed)
    }

    pub async fn remove_rules(&self, rules: &[PolicyRule]) -> Result<usize, AppError> {
        let removed = self.timed(self.store.remove_rules(rules)).await?;
        self.invalidate().await;
        Ok(removed)
    }

    pub async fn remove_rules_for_subject(&self, subject: &str) -> Result<usize, AppError> {
        let removed = self
            .timed(self.store.remove_rules_for_subject(subject))
            .await?;
        self.invalidate().await;
        Ok(removed)
    }

    pub async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<PolicyRule>, AppError> {
        self.timed(self.store.list_rules(filter)).await
    }

    pub async fn add_group_rule(&self, rule: &GroupRule) -> Result<bool, AppError> {
        let added = self.timed(self.store.add_group_rule(rule)).await?;
        self.invalidate().await;
        Ok(added)
    }

    pub async fn add_group_rules(&self, rules: &[GroupRule]) -> Result<usize, AppError> {
        let added = self.timed(self.store.add_group_rules(rules)).await?;
        self.invalidate().await;
        Ok(added)
    }

    pub async fn remove_group_rule(&self, rule: &GroupRule) -> Result<bool, AppError> {
        let removed = self.timed(self.store.remove_group_rule(rule)).await?;
        self.invalidate().await;
        Ok(removed)
    }

    pub async fn remove_group_rules_for_member(&self, member: &str) -> Result<usize, AppError> {
        let removed = self
            .timed(self.store.remove_group_rules_for_member(member))
            .await?;
        self.invalidate().await;
        Ok(removed)
    }

    pub async fn list_group_rules(&self, member: Option<&str>) -> Result<Vec<GroupRule>, AppError> {
        self.timed(self.store.list_group_rules(member)).await
    }
}

#[async_trait]
impl PermissionChecker for PolicyEngine {
    async fn authorize(
        &self,
        identity: &Identity,
        object: &str,
        action: &str,
    ) -> Result<bool, AppError> {
        if identity.is_superuser {
            tracing::debug!(identity = %identity.uuid, "superuser bypass");
            return Ok(true);
        }

        let compiled = self.snapshot().await?;

        let mut seeds: Vec<String> = vec![identity.subject()];
        seeds.extend(identity.role_ids.iter().map(|id| role_subject(*id)));
        let effective = compiled.transitive_groups(&seeds);

        let allowed = compiled.any_grant_matches(&effective, object, action);
        tracing::debug!(
            identity = %identity.uuid,
            object = %object,
            action = %action,
            allowed,
            "policy decision"
        );

        Ok(allowed)
    }
}
