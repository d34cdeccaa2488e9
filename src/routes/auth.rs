use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::models::identity::{
    Identity, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse,
};
use crate::utils::verify_password;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

/// Credential store reads outside the session service still run under the
/// configured store timeout.
async fn timed<T>(
    state: &AppState,
    fut: impl std::future::Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::time::timeout(state.config.store_timeout, fut)
        .await
        .map_err(|_| AppError::SessionStoreUnavailable("credential store timed out".into()))?
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Identity is not backend staff")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (identity, password_hash) = timed(
        &state,
        state.credentials.get_identity_by_username(&payload.username),
    )
    .await?
    .ok_or_else(|| AppError::unauthorized("unknown username"))?;

    if !verify_password(&payload.password, &password_hash)? {
        return Err(AppError::unauthorized("wrong password"));
    }

    if !identity.enabled {
        return Err(AppError::IdentityDisabled);
    }

    if !identity.is_staff {
        return Err(AppError::forbidden("backend access requires staff status"));
    }

    let pair = state.sessions.issue(&identity).await?;
    timed(&state, state.credentials.touch_last_login(identity.id)).await?;

    tracing::info!(identity = %identity.uuid, username = %identity.username, "login succeeded");

    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: identity,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<MessageResponse>> {
    state.sessions.revoke(user.0.uuid).await?;

    Ok(Json(MessageResponse {
        message: "logged out".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/token/new",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Access token rotated", body = RefreshResponse),
        (status = 401, description = "Refresh token invalid or superseded")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let pair = state.sessions.refresh(&payload.refresh_token).await?;

    Ok(Json(RefreshResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current identity", body = Identity),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(user: CurrentUser) -> (StatusCode, Json<Identity>) {
    (StatusCode::OK, Json(user.0.as_ref().clone()))
}
