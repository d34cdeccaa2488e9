use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::PermissionChecker;
use crate::errors::AppError;
use crate::models::identity::Identity;
use crate::store::CredentialStore;

/// Maps a protected route to the permission tag it requires.
#[derive(Debug, Clone)]
pub struct RouteTag {
    pub method: &'static str,
    pub path_prefix: &'static str,
    pub tag: &'static str,
}

const fn route(method: &'static str, path_prefix: &'static str, tag: &'static str) -> RouteTag {
    RouteTag {
        method,
        path_prefix,
        tag,
    }
}

/// The statically declared gate table for role-menu deployments. Routes not
/// listed here carry no tag and pass the gate.
fn default_route_table() -> Vec<RouteTag> {
    vec![
        route("GET", "/sys/menus/all", "sys:menu:list"),
        route("POST", "/sys/menus", "sys:menu:add"),
        route("DELETE", "/sys/menus", "sys:menu:del"),
        route("GET", "/sys/policies", "sys:policy:list"),
        route("POST", "/sys/policies", "sys:policy:add"),
        route("DELETE", "/sys/policies", "sys:policy:del"),
    ]
}

/// Permission check without the policy store: the identity's enabled roles
/// grant menu permission tags, and the request's route must map to one of
/// them.
pub struct StaticRoleChecker {
    credentials: Arc<dyn CredentialStore>,
    routes: Vec<RouteTag>,
    exclude_tags: HashSet<String>,
    store_timeout: Duration,
}

impl StaticRoleChecker {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        exclude_tags: HashSet<String>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            routes: default_route_table(),
            exclude_tags,
            store_timeout,
        }
    }

    #[cfg(test)]
    fn with_routes(mut self, routes: Vec<RouteTag>) -> Self {
        self.routes = routes;
        self
    }

    fn required_tag(&self, object: &str, action: &str) -> Option<&'static str> {
        self.routes
            .iter()
            .find(|route| {
                route.method.eq_ignore_ascii_case(action) && object.starts_with(route.path_prefix)
            })
            .map(|route| route.tag)
    }
}

#[async_trait]
impl PermissionChecker for StaticRoleChecker {
    async fn authorize(
        &self,
        identity: &Identity,
        object: &str,
        action: &str,
    ) -> Result<bool, AppError> {
        if identity.is_superuser {
            return Ok(true);
        }

        let Some(tag) = self.required_tag(object, action) else {
            // Untagged routes are not gated in this mode.
            return Ok(true);
        };

        if self.exclude_tags.contains(tag) {
            return Ok(true);
        }

        let granted = tokio::time::timeout(
            self.store_timeout,
            self.credentials.role_permission_tags(&identity.role_ids),
        )
        .await
        .map_err(|_| AppError::PolicyStoreUnavailable("credential store timed out".into()))??;

        let allowed = granted.contains(tag);
        tracing::debug!(
            identity = %identity.uuid,
            tag = %tag,
            allowed,
            "static role decision"
        );

        Ok(allowed)
    }
}
