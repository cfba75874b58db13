//! Access-token validation against provider introspection endpoints.
//!
//! Runs before any crawl work starts: a token the provider rejects aborts
//! the whole operation with `AuthInvalid`. Transient introspection failures
//! are retried with exponential backoff and jitter.

use crate::connectors::http::{bearer_client, error_for_status, PROVIDER_TIMEOUT};
use crate::models::Platform;
use backoff::ExponentialBackoff;
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Duration;

const GOOGLE_TOKENINFO: &str = "https://oauth2.googleapis.com/tokeninfo";
const NOTION_ME: &str = "https://api.notion.com/v1/users/me";
const GRAPH_ME: &str = "https://graph.microsoft.com/v1.0/me";

#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    #[serde(default)]
    scope: String,
}

/// Validate the token with its platform and return the granted scopes.
/// Google reports explicit scopes; Notion and Microsoft grants are implicit
/// and return an empty list.
pub async fn validate_token(
    platform: Platform,
    access_token: &str,
) -> Result<Vec<String>, AppError> {
    // Base 1 s, doubling, jittered; bounded to three attempts' worth.
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_secs(1),
        max_elapsed_time: Some(Duration::from_secs(7)),
        ..Default::default()
    };

    backoff::future::retry(policy, || async {
        match introspect(platform, access_token).await {
            Ok(scopes) => Ok(scopes),
            Err(e @ AppError::AuthInvalid(_)) => Err(backoff::Error::permanent(e)),
            Err(e) => Err(backoff::Error::transient(e)),
        }
    })
    .await
}

async fn introspect(platform: Platform, access_token: &str) -> Result<Vec<String>, AppError> {
    match platform {
        Platform::Google => {
            let client = reqwest::Client::builder()
                .timeout(PROVIDER_TIMEOUT)
                .build()
                .map_err(|e| {
                    AppError::InternalError(anyhow::anyhow!("Failed to build client: {}", e))
                })?;

            let response = client
                .get(GOOGLE_TOKENINFO)
                .query(&[("access_token", access_token)])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(AppError::AuthInvalid(anyhow::anyhow!(
                    "Google rejected the access token: {}",
                    response.status()
                )));
            }

            let info: GoogleTokenInfo = response.json().await.map_err(|e| {
                AppError::Transport(anyhow::anyhow!("Undecodable tokeninfo: {}", e))
            })?;
            Ok(info.scope.split_whitespace().map(String::from).collect())
        }
        Platform::Notion => {
            let client = bearer_client(access_token)?;
            let response = client
                .get(NOTION_ME)
                .header("Notion-Version", "2022-06-28")
                .send()
                .await?;
            error_for_status(response, "notion.users.me").await?;
            Ok(Vec::new())
        }
        Platform::Microsoft => {
            let client = bearer_client(access_token)?;
            let response = client.get(GRAPH_ME).send().await?;
            error_for_status(response, "graph.me").await?;
            Ok(Vec::new())
        }
        Platform::Local => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_scope_string_splits() {
        let info: GoogleTokenInfo = serde_json::from_value(serde_json::json!({
            "scope": "https://www.googleapis.com/auth/drive.readonly https://www.googleapis.com/auth/gmail.readonly",
            "expires_in": 3599
        }))
        .unwrap();
        let scopes: Vec<String> = info.scope.split_whitespace().map(String::from).collect();
        assert_eq!(scopes.len(), 2);
        assert!(scopes[0].ends_with("drive.readonly"));
    }
}
