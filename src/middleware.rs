use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::app::AppState;
use crate::errors::AppError;
use crate::models::identity::Identity;

/// Authenticated identity for the current request, inserted by the auth
/// middleware and read by handlers through the extractor below.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Arc<Identity>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("no authenticated identity"))
    }
}

/// Per-request authentication stage: extract the bearer token, validate it
/// against the session service, hydrate the identity. Failures short-circuit
/// before any handler or the permission gate runs; the response body never
/// reveals which way validation failed.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if is_auth_exempt(&state, path) {
        return next.run(req).await;
    }

    match authenticate(&state, req.headers()).await {
        Ok(identity) => {
            req.extensions_mut().insert(CurrentUser(Arc::new(identity)));
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(path = %path, kind = ?err, "request rejected by auth middleware");
            err.into_response()
        }
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

    state.sessions.validate(token).await
}

/// Permission gate stage, after authentication: exempt routes pass straight
/// through, everything else asks the configured checker. Read-only with
/// respect to policy state.
pub async fn permission_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();

    if is_auth_exempt(&state, &path)
        || state
            .config
            .gate_exempt
            .contains(&(method.clone(), path.clone()))
    {
        return next.run(req).await;
    }

    let Some(user) = req.extensions().get::<CurrentUser>().cloned() else {
        return AppError::unauthorized("no authenticated identity").into_response();
    };

    match state.checker.authorize(&user.0, &path, &method).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::info!(
                identity = %user.0.uuid,
                method = %method,
                path = %path,
                "request denied by permission gate"
            );
            AppError::permission_denied(format!("{method} {path}")).into_response()
        }
        Err(err) => {
            if err.is_transient() {
                tracing::warn!(
                    identity = %user.0.uuid,
                    method = %method,
                    path = %path,
                    "permission check unavailable, not denied"
                );
            }
            err.into_response()
        }
    }
}

fn is_auth_exempt(state: &AppState, path: &str) -> bool {
    state.config.auth_exempt_paths.contains(path)
        || path.starts_with("/docs")
        || path.starts_with("/api-docs")
}
