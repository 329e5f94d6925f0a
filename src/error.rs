use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::lifecycle::ConcernStatus;

/// Result alias used by handlers, the repository layer and the lifecycle service.
pub type AppResult<T> = Result<T, AppError>;

/// AppError
///
/// The single failure taxonomy of the API. Every variant renders to a structured
/// JSON body (`{"error": {"kind", "message"}}`) so no failure crosses the network
/// boundary as a bare status code.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input (length bounds, ranges, unknown enum values).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// No usable credentials were presented.
    #[error("authentication required")]
    Unauthorized,

    /// The caller's role is not admitted by the policy table.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The requested status is not reachable from the current one.
    #[error("cannot move concern from {from:?} to {to:?}")]
    InvalidTransition {
        from: ConcernStatus,
        to: ConcernStatus,
    },

    /// A concurrent writer committed first; the caller's snapshot is stale.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence, identity or storage collaborator failure.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind, mirrored by the client error handler.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFound",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::Conflict(_) => "ConflictError",
            Self::UpstreamUnavailable(_) => "UpstreamUnavailable",
            Self::Internal(_) => "Internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();

        if status.is_server_error() {
            tracing::error!(error = %self, kind, "request failed");
        } else {
            tracing::debug!(error = %self, kind, "request rejected");
        }

        let body = Json(json!({
            "error": {
                "kind": kind,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("row".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            _ => Self::UpstreamUnavailable(format!("database: {err}")),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::UpstreamUnavailable(format!("identity provider: {err}"))
    }
}
