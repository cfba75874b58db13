use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy shared by the pipeline services.
///
/// Variants mirror how failures are handled, not where they originate:
/// `Transport` is retried at the call site, `AuthInvalid` aborts the
/// operation, `PartialFailure` is surfaced at the RPC boundary with the
/// per-worker details intact.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Auth invalid: {0}")]
    AuthInvalid(anyhow::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String, Option<u64>),

    #[error("Transport error: {0}")]
    Transport(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Malformed: {0}")]
    Malformed(anyhow::Error),

    #[error("Partial failure: {} of the crawl workers failed", .0.len())]
    PartialFailure(Vec<String>),

    #[error("Cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a retry at the same layer can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Transport(_) | AppError::RateLimited(_, _) | AppError::DatabaseError(_)
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => {
                AppError::NotFound(anyhow::anyhow!("Row not found"))
            }
            other => AppError::DatabaseError(anyhow::Error::new(other)),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error_message, details, retry_after) = match self {
            AppError::AuthInvalid(err) => {
                (StatusCode::UNAUTHORIZED, err.to_string(), None, None)
            }
            AppError::RateLimited(msg, retry) => {
                (StatusCode::TOO_MANY_REQUESTS, msg, None, retry)
            }
            AppError::Transport(err) => (
                StatusCode::BAD_GATEWAY,
                "Upstream transport error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None, None),
            AppError::Malformed(err) => {
                (StatusCode::BAD_REQUEST, err.to_string(), None, None)
            }
            AppError::PartialFailure(errors) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Partial failure".to_string(),
                Some(errors.join("; ")),
                None,
            ),
            AppError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Operation cancelled".to_string(),
                None,
                None,
            ),
            AppError::DatabaseError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::InternalError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(format!("{:#?}", err)),
                None,
            ),
        };

        let mut res = (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}
