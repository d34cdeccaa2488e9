use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::AppError;

/// Permission checking mode, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    /// Rules are read from the policy store and matched dynamically.
    DynamicPolicy,
    /// Routes map to static permission tags checked against role menu grants.
    StaticRole,
}

impl EnforcementMode {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "casbin" | "dynamic-policy" => Ok(EnforcementMode::DynamicPolicy),
            "role-menu" | "static-role" => Ok(EnforcementMode::StaticRole),
            other => Err(AppError::configuration(format!(
                "PERMISSION_MODE must be 'casbin' or 'role-menu', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub token_secret: Arc<Vec<u8>>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub enforcement_mode: EnforcementMode,
    /// Bounded timeout for session and policy store calls.
    pub store_timeout: Duration,
    /// Paths that skip the auth middleware entirely.
    pub auth_exempt_paths: HashSet<String>,
    /// (method, path) pairs that skip the permission gate.
    pub gate_exempt: HashSet<(String, String)>,
    /// Static-role mode: permission tags that are never enforced.
    pub static_exclude_tags: HashSet<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("TOKEN_SECRET")
            .map_err(|_| AppError::configuration("TOKEN_SECRET not set"))?;

        let access_secs = env_u64("TOKEN_EXPIRE_SECONDS", 60 * 60 * 24)?;
        let refresh_secs = env_u64("TOKEN_REFRESH_EXPIRE_SECONDS", 60 * 60 * 24 * 7)?;
        let store_timeout_ms = env_u64("STORE_TIMEOUT_MS", 1000)?;

        let mode = match std::env::var("PERMISSION_MODE") {
            Ok(value) => EnforcementMode::parse(&value)?,
            Err(_) => EnforcementMode::DynamicPolicy,
        };

        let mut auth_exempt_paths = default_auth_exempt();
        if let Ok(extra) = std::env::var("AUTH_EXEMPT_PATHS") {
            auth_exempt_paths.extend(extra.split(',').map(|p| p.trim().to_string()));
        }

        // Comma-separated "METHOD:/path" entries.
        let mut gate_exempt = default_gate_exempt();
        if let Ok(extra) = std::env::var("GATE_EXEMPT_ROUTES") {
            for entry in extra.split(',') {
                if let Some((method, path)) = entry.trim().split_once(':') {
                    gate_exempt.insert((method.to_uppercase(), path.to_string()));
                }
            }
        }

        Ok(Self {
            token_secret: Arc::new(secret.into_bytes()),
            access_token_ttl: Duration::from_secs(access_secs),
            refresh_token_ttl: Duration::from_secs(refresh_secs),
            enforcement_mode: mode,
            store_timeout: Duration::from_millis(store_timeout_ms),
            auth_exempt_paths,
            gate_exempt,
            static_exclude_tags: default_static_excludes(),
        })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, AppError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|_| AppError::configuration(format!("{key} must be a valid integer"))),
        Err(_) => Ok(default),
    }
}

fn default_auth_exempt() -> HashSet<String> {
    ["/auth/login", "/auth/token/new", "/health"]
        .into_iter()
        .map(String::from)
        .collect()
}

// Identity-bound operations carry their own protection (a valid session)
// and are never policy questions.
fn default_gate_exempt() -> HashSet<(String, String)> {
    [
        ("POST", "/auth/logout"),
        ("POST", "/auth/token/new"),
        ("GET", "/auth/me"),
        ("GET", "/sys/menus"),
    ]
    .into_iter()
    .map(|(m, p)| (m.to_string(), p.to_string()))
    .collect()
}

fn default_static_excludes() -> HashSet<String> {
    ["sys:monitor:redis", "sys:monitor:server"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_mode_spellings() {
        assert_eq!(
            EnforcementMode::parse("casbin").unwrap(),
            EnforcementMode::DynamicPolicy
        );
        assert_eq!(
            EnforcementMode::parse("dynamic-policy").unwrap(),
            EnforcementMode::DynamicPolicy
        );
        assert_eq!(
            EnforcementMode::parse("role-menu").unwrap(),
            EnforcementMode::StaticRole
        );
        assert!(EnforcementMode::parse("acl").is_err());
    }

    #[test]
    fn logout_and_refresh_are_gate_exempt_by_default() {
        let exempt = default_gate_exempt();
        assert!(exempt.contains(&("POST".to_string(), "/auth/logout".to_string())));
        assert!(exempt.contains(&("POST".to_string(), "/auth/token/new".to_string())));
    }
}
