//! Error conversion utilities between `AppError` and `tonic::Status`.
//!
//! | AppError | gRPC Status |
//! |----------|-------------|
//! | `AuthInvalid` | `UNAUTHENTICATED` |
//! | `RateLimited` | `RESOURCE_EXHAUSTED` |
//! | `Transport` | `UNAVAILABLE` |
//! | `NotFound` | `NOT_FOUND` |
//! | `Malformed` | `INVALID_ARGUMENT` |
//! | `PartialFailure` | `INTERNAL` (worker details in the message) |
//! | `Cancelled` | `CANCELLED` |

use tonic::{Code, Status};

use crate::error::AppError;

/// Extension trait for converting types into `tonic::Status`.
pub trait IntoStatus {
    /// Convert into a `tonic::Status`.
    fn into_status(self) -> Status;
}

impl IntoStatus for AppError {
    fn into_status(self) -> Status {
        match self {
            AppError::AuthInvalid(err) => Status::unauthenticated(err.to_string()),
            AppError::RateLimited(msg, retry_after) => {
                let mut status = Status::resource_exhausted(msg);
                if let Some(seconds) = retry_after {
                    // Add retry-after as metadata
                    if let Ok(value) = seconds.to_string().parse() {
                        status.metadata_mut().insert("retry-after", value);
                    }
                }
                status
            }
            AppError::Transport(err) => Status::unavailable(err.to_string()),
            AppError::NotFound(err) => Status::not_found(err.to_string()),
            AppError::Malformed(err) => Status::invalid_argument(err.to_string()),
            AppError::PartialFailure(errors) => {
                Status::internal(format!("partial failure: {}", errors.join("; ")))
            }
            AppError::Cancelled => Status::cancelled("operation cancelled"),
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                Status::internal("Database error")
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                Status::internal("Configuration error")
            }
            AppError::InternalError(err) => {
                // Log the full error but don't expose it to clients
                tracing::error!(error = %err, "Internal error");
                Status::internal("Internal server error")
            }
        }
    }
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        err.into_status()
    }
}

/// Convert a `tonic::Status` back to an `AppError`.
/// This is useful when a gRPC client receives an error and needs to propagate it.
impl From<Status> for AppError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::Unauthenticated => {
                AppError::AuthInvalid(anyhow::anyhow!("{}", status.message()))
            }
            Code::ResourceExhausted => {
                let retry_after = status
                    .metadata()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok());
                AppError::RateLimited(status.message().to_string(), retry_after)
            }
            Code::NotFound => AppError::NotFound(anyhow::anyhow!("{}", status.message())),
            Code::InvalidArgument | Code::OutOfRange | Code::FailedPrecondition => {
                AppError::Malformed(anyhow::anyhow!("{}", status.message()))
            }
            Code::Unavailable | Code::DeadlineExceeded => {
                AppError::Transport(anyhow::anyhow!("{}", status.message()))
            }
            Code::Cancelled => AppError::Cancelled,
            _ => AppError::InternalError(anyhow::anyhow!("{}", status.message())),
        }
    }
}

/// Result type alias for gRPC handlers.
pub type GrpcResult<T> = Result<tonic::Response<T>, Status>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_to_status() {
        let err = AppError::NotFound(anyhow::anyhow!("Resource removed upstream"));
        let status: Status = err.into();
        assert_eq!(status.code(), Code::NotFound);
        assert!(status.message().contains("Resource removed upstream"));
    }

    #[test]
    fn test_status_to_app_error() {
        let status = Status::unauthenticated("token rejected");
        let err: AppError = status.into();
        match err {
            AppError::AuthInvalid(e) => assert!(e.to_string().contains("token rejected")),
            _ => panic!("Expected AuthInvalid error"),
        }
    }

    #[test]
    fn test_rate_limit_error() {
        let err = AppError::RateLimited("Rate limit exceeded".to_string(), Some(60));
        let status: Status = err.into();
        assert_eq!(status.code(), Code::ResourceExhausted);
        assert_eq!(
            status
                .metadata()
                .get("retry-after")
                .unwrap()
                .to_str()
                .unwrap(),
            "60"
        );
    }

    #[test]
    fn test_partial_failure_message() {
        let err = AppError::PartialFailure(vec![
            "GOOGLE_DRIVE: timeout".to_string(),
            "GOOGLE_GMAIL: 500".to_string(),
        ]);
        let status: Status = err.into();
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("GOOGLE_DRIVE: timeout"));
    }
}
