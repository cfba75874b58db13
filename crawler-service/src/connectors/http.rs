//! OAuth HTTP client construction shared by all connectors.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use service_core::error::AppError;
use std::time::Duration;

/// Per-attempt timeout for provider HTTP calls.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a client that sends `Authorization: Bearer <token>` on every
/// request.
pub fn bearer_client(access_token: &str) -> Result<reqwest::Client, AppError> {
    bearer_client_with(access_token, HeaderMap::new())
}

/// Bearer client with additional default headers (e.g. `Notion-Version`).
pub fn bearer_client_with(
    access_token: &str,
    mut headers: HeaderMap,
) -> Result<reqwest::Client, AppError> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", access_token))
        .map_err(|_| AppError::AuthInvalid(anyhow::anyhow!("access token is not header-safe")))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .default_headers(headers)
        .build()
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to build client: {}", e)))
}

/// Map a non-success provider response to the error taxonomy.
pub async fn error_for_status(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(AppError::AuthInvalid(anyhow::anyhow!(
            "{}: {} {}",
            context,
            status,
            body
        ))),
        404 => Err(AppError::NotFound(anyhow::anyhow!(
            "{}: resource gone upstream",
            context
        ))),
        429 => Err(AppError::RateLimited(
            format!("{}: provider throttled", context),
            None,
        )),
        _ => Err(AppError::Transport(anyhow::anyhow!(
            "{}: {} {}",
            context,
            status,
            body
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tokens_with_control_characters() {
        let err = bearer_client("bad\ntoken").unwrap_err();
        assert!(matches!(err, AppError::AuthInvalid(_)));
    }

    #[test]
    fn builds_client_for_normal_tokens() {
        assert!(bearer_client("ya29.a0AfH6SMC").is_ok());
    }
}
