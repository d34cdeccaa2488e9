use std::sync::Arc;

use axum::http::Method;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{PermissionChecker, PolicyEngine, SqlPolicyStore, StaticRoleChecker};
use crate::config::{AppConfig, EnforcementMode};
use crate::errors::AppError;
use crate::middleware::{auth_middleware, permission_gate};
use crate::routes::{auth, health, menus, policies};
use crate::session::{MemorySessionStore, SessionService};
use crate::store::{CredentialStore, SqlCredentialStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<SessionService>,
    pub engine: Arc<PolicyEngine>,
    pub checker: Arc<dyn PermissionChecker>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let config = Arc::new(config);
        let credentials: Arc<dyn CredentialStore> = Arc::new(SqlCredentialStore::new(pool.clone()));

        let sessions = Arc::new(SessionService::new(
            &config,
            Arc::new(MemorySessionStore::default()),
            credentials.clone(),
        ));

        let engine = Arc::new(PolicyEngine::new(
            Arc::new(SqlPolicyStore::new(pool.clone())),
            config.store_timeout,
        ));

        let checker: Arc<dyn PermissionChecker> = match config.enforcement_mode {
            EnforcementMode::DynamicPolicy => engine.clone(),
            EnforcementMode::StaticRole => Arc::new(StaticRoleChecker::new(
                credentials.clone(),
                config.static_exclude_tags.clone(),
                config.store_timeout,
            )),
        };

        Self {
            pool,
            config,
            credentials,
            sessions,
            engine,
            checker,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let config = AppConfig::from_env()?;
    create_app_with_config(pool, config).await
}

pub async fn create_app_with_config(pool: SqlitePool, config: AppConfig) -> Result<Router, AppError> {
    let state = AppState::new(pool, config);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/token/new", post(auth::refresh))
        .route("/me", get(auth::me));

    let menu_routes = Router::new()
        .route("/", get(menus::user_menu_tree))
        .route("/", post(menus::create_menu))
        .route("/all", get(menus::full_menu_tree))
        .route("/:id", delete(menus::delete_menu));

    let policy_routes = Router::new()
        .route("/", get(policies::list_rules))
        .route("/", post(policies::add_rule))
        .route("/", delete(policies::remove_rule))
        .route("/batch", post(policies::add_rules))
        .route("/batch", delete(policies::remove_rules))
        .route("/subject/:subject", delete(policies::remove_rules_for_subject))
        .route("/groups", get(policies::list_group_rules))
        .route("/groups", post(policies::add_group_rule))
        .route("/groups", delete(policies::remove_group_rule))
        .route("/groups/batch", post(policies::add_group_rules))
        .route(
            "/groups/member/:member",
            delete(policies::remove_group_rules_for_member),
        );

    // The gate layer sits inside the auth layer: authentication runs first
    // and hydrates the identity the gate consumes.
    let router = Router::new()
        .nest("/auth", auth_routes)
        .nest("/sys/menus", menu_routes)
        .nest("/sys/policies", policy_routes)
        .route("/health", get(health::health))
        .layer(from_fn_with_state(state.clone(), permission_gate))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
