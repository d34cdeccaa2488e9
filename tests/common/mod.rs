// not every test binary uses every helper
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use admingate::config::{AppConfig, EnforcementMode};
use admingate::create_app_with_config;
use admingate::utils::hash_password;

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    // dropped with the test, removing the sqlite file
    _dir: TempDir,
}

pub fn test_config(mode: EnforcementMode) -> AppConfig {
    AppConfig {
        token_secret: Arc::new(b"integration-secret".to_vec()),
        access_token_ttl: Duration::from_secs(600),
        refresh_token_ttl: Duration::from_secs(3600),
        enforcement_mode: mode,
        store_timeout: Duration::from_secs(1),
        auth_exempt_paths: ["/auth/login", "/auth/token/new", "/health"]
            .into_iter()
            .map(String::from)
            .collect(),
        gate_exempt: [
            ("POST", "/auth/logout"),
            ("POST", "/auth/token/new"),
            ("GET", "/auth/me"),
            ("GET", "/sys/menus"),
        ]
        .into_iter()
        .map(|(m, p)| (m.to_string(), p.to_string()))
        .collect(),
        static_exclude_tags: HashSet::new(),
    }
}

pub async fn spawn_app(mode: EnforcementMode) -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    let app = create_app_with_config(pool.clone(), test_config(mode)).await?;

    Ok(TestApp {
        app,
        pool,
        _dir: dir,
    })
}

pub struct UserSpec<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub enabled: bool,
    pub multi_login: bool,
}

impl<'a> UserSpec<'a> {
    pub fn staff(username: &'a str, password: &'a str) -> Self {
        Self {
            username,
            password,
            is_superuser: false,
            is_staff: true,
            enabled: true,
            multi_login: false,
        }
    }

    pub fn superuser(username: &'a str, password: &'a str) -> Self {
        Self {
            is_superuser: true,
            ..Self::staff(username, password)
        }
    }
}

pub async fn seed_user(pool: &SqlitePool, spec: &UserSpec<'_>) -> Result<(i64, Uuid)> {
    let uuid = Uuid::new_v4();
    let password_hash = hash_password(spec.password)?;

    let id = sqlx::query(
        "INSERT INTO sys_user \
         (uuid, username, nickname, password_hash, is_superuser, is_staff, enabled, multi_login, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid)
    .bind(spec.username)
    .bind(spec.username)
    .bind(&password_hash)
    .bind(spec.is_superuser)
    .bind(spec.is_staff)
    .bind(spec.enabled)
    .bind(spec.multi_login)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok((id, uuid))
}

pub async fn seed_role(pool: &SqlitePool, name: &str) -> Result<i64> {
    let id = sqlx::query("INSERT INTO sys_role (name, data_scope, enabled) VALUES (?, 'all', 1)")
        .bind(name)
        .execute(pool)
        .await?
        .last_insert_rowid();
    Ok(id)
}

pub async fn assign_role(pool: &SqlitePool, user_id: i64, role_id: i64) -> Result<()> {
    sqlx::query("INSERT INTO sys_user_role (user_id, role_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn seed_menu(
    pool: &SqlitePool,
    title: &str,
    parent_id: Option<i64>,
    perms: Option<&str>,
    sort: i64,
) -> Result<i64> {
    let id = sqlx::query(
        "INSERT INTO sys_menu (title, name, parent_id, menu_type, perms, sort, status, show) \
         VALUES (?, ?, ?, 1, ?, ?, 1, 1)",
    )
    .bind(title)
    .bind(title)
    .bind(parent_id)
    .bind(perms)
    .bind(sort)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn grant_role_menu(pool: &SqlitePool, role_id: i64, menu_id: i64) -> Result<()> {
    sqlx::query("INSERT INTO sys_role_menu (role_id, menu_id) VALUES (?, ?)")
        .bind(role_id)
        .bind(menu_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok((status, value))
}

/// Logs in and returns (access_token, refresh_token).
pub async fn login(app: &Router, username: &str, password: &str) -> Result<(String, String)> {
    let (status, body) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK, "login failed: {status} {body}");

    let access = body
        .get("access_token")
        .and_then(Value::as_str)
        .context("missing access_token")?
        .to_string();
    let refresh = body
        .get("refresh_token")
        .and_then(Value::as_str)
        .context("missing refresh_token")?
        .to_string();

    Ok((access, refresh))
}
