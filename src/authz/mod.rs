//! Authorization engine - policy storage, rule matching and enforcement
//!
//! Two enforcement modes sit behind one interface:
//! - dynamic-policy: (subject, object, action) rules with group closure,
//!   matched against a compiled in-process cache
//! - static-role: route-to-permission-tag table checked against role menu
//!   grants, for deployments without dynamic policy editing

mod engine;
mod policy;
mod static_mode;

pub use engine::PolicyEngine;
pub use policy::{
    GroupRule, MemoryPolicyStore, PolicyRule, PolicyStore, RuleFilter, SqlPolicyStore,
};
pub use static_mode::{RouteTag, StaticRoleChecker};

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::identity::Identity;

/// Pluggable permission check invoked by the gate before every privileged
/// handler. Implementations are read-only with respect to policy state.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// May this identity perform `action` on `object`?
    ///
    /// `Ok(false)` is a deny; store failures surface as transient errors,
    /// never as denies.
    async fn authorize(
        &self,
        identity: &Identity,
        object: &str,
        action: &str,
    ) -> Result<bool, AppError>;
}
