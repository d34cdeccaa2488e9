use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("token invalid: {0}")]
    TokenInvalid(String),
    #[error("token expired")]
    TokenExpired,
    #[error("session superseded")]
    SessionSuperseded,
    #[error("identity disabled")]
    IdentityDisabled,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("session store unavailable: {0}")]
    SessionStoreUnavailable(String),
    #[error("policy store unavailable: {0}")]
    PolicyStoreUnavailable(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn token_invalid(message: impl Into<String>) -> Self {
        Self::TokenInvalid(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for failures of a backing store, where the caller should retry
    /// rather than treat the outcome as an authorization decision.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::SessionStoreUnavailable(_) | AppError::PolicyStoreUnavailable(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Authentication failures collapse into one uniform body: callers must
        // not learn whether a token was expired, superseded or malformed.
        let (status, error, message) = match &self {
            AppError::TokenInvalid(_)
            | AppError::TokenExpired
            | AppError::SessionSuperseded
            | AppError::IdentityDisabled
            | AppError::Unauthorized(_) => {
                tracing::debug!(kind = ?self, "authentication rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    "authentication required".to_string(),
                )
            }
            AppError::PermissionDenied(_) | AppError::Forbidden(_) => {
                tracing::debug!(kind = ?self, "authorization rejected");
                (
                    StatusCode::FORBIDDEN,
                    "forbidden",
                    "permission denied".to_string(),
                )
            }
            AppError::SessionStoreUnavailable(_) | AppError::PolicyStoreUnavailable(_) => {
                tracing::error!(kind = ?self, "backing store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "temporarily unavailable, retry".to_string(),
                )
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict", self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", self.to_string()),
            AppError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration",
                self.to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database",
                "database error".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                self.to_string(),
            ),
        };

        let payload = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
