mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use admingate::config::EnforcementMode;
use common::{login, seed_user, send, spawn_app, UserSpec};

#[tokio::test]
async fn login_me_logout_flow() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    seed_user(&test.pool, &UserSpec::staff("ada", "password123")).await?;

    let (access, _) = login(&test.app, "ada", "password123").await?;

    let (status, body) = send(&test.app, "GET", "/auth/me", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ada");

    let (status, _) = send(&test.app, "POST", "/auth/logout", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);

    // single-login identity: the revoked token no longer validates
    let (status, _) = send(&test.app, "GET", "/auth/me", Some(&access), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn bad_credentials_get_uniform_unauthorized() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    seed_user(&test.pool, &UserSpec::staff("ada", "password123")).await?;

    let (status, body) = send(
        &test.app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "ada", "password": "wrong-password" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, unknown_body) = send(
        &test.app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "nobody", "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // unknown user and wrong password are indistinguishable to the caller
    assert_eq!(body, unknown_body);

    Ok(())
}

#[tokio::test]
async fn disabled_user_cannot_login() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    let spec = UserSpec {
        enabled: false,
        ..UserSpec::staff("ada", "password123")
    };
    seed_user(&test.pool, &spec).await?;

    let (status, _) = send(
        &test.app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "ada", "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn non_staff_user_is_forbidden() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    let spec = UserSpec {
        is_staff: false,
        ..UserSpec::staff("ada", "password123")
    };
    seed_user(&test.pool, &spec).await?;

    let (status, body) = send(
        &test.app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "ada", "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    Ok(())
}

#[tokio::test]
async fn missing_or_garbage_token_is_unauthorized() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;

    let (status, _) = send(&test.app, "GET", "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&test.app, "GET", "/auth/me", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn refresh_issues_working_access_token() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    seed_user(&test.pool, &UserSpec::staff("ada", "password123")).await?;

    let (_, refresh) = login(&test.app, "ada", "password123").await?;

    let (status, body) = send(
        &test.app,
        "POST",
        "/auth/token/new",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let access = body["access_token"].as_str().unwrap();
    let (status, body) = send(&test.app, "GET", "/auth/me", Some(access), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ada");

    Ok(())
}

#[tokio::test]
async fn refresh_rejects_an_access_token() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    seed_user(&test.pool, &UserSpec::staff("ada", "password123")).await?;

    let (access, _) = login(&test.app, "ada", "password123").await?;

    let (status, _) = send(
        &test.app,
        "POST",
        "/auth/token/new",
        None,
        Some(json!({ "refresh_token": access })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn login_records_last_login_timestamp() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    let (user_id, _) = seed_user(&test.pool, &UserSpec::staff("ada", "password123")).await?;

    login(&test.app, "ada", "password123").await?;

    let last_login: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar("SELECT last_login_at FROM sys_user WHERE id = ?")
            .bind(user_id)
            .fetch_one(&test.pool)
            .await?;
    assert!(last_login.is_some());

    Ok(())
}

#[tokio::test]
async fn health_needs_no_token() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;

    let (status, body) = send(&test.app, "GET", "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_ok"], true);

    Ok(())
}
