//! OAuth2 client-credentials token exchange.

use crate::config::{Secret, TokenRequest};
use crate::error::{DiscoveryError, Result, truncate_for_message};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_GRANT_TYPE: &str = "client_credentials";
const PAYLOAD_PREVIEW_CHARS: usize = 200;

/// Bearer token obtained from a token endpoint. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(Secret);

impl AccessToken {
    /// Raw token value for the `Authorization` header.
    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Fetches access tokens with a form-encoded POST.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    client: reqwest::Client,
    timeout: Duration,
}

impl TokenExchanger {
    /// Creates an exchanger sharing `client`, bounding each request by `timeout`.
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Exchanges client credentials for an access token.
    ///
    /// The response's `access_token` field is used, `token` as a fallback.
    ///
    /// # Errors
    /// Returns `Auth` on transport failure, non-2xx status or a response
    /// without a token
    pub async fn fetch_token(&self, request: &TokenRequest) -> Result<AccessToken> {
        let form = token_form(request);
        debug!("Fetching OAuth2 access token from {}", request.token_url);

        let response = self
            .client
            .post(request.token_url.trim())
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DiscoveryError::auth(format!(
                        "token request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    DiscoveryError::auth(format!("token request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DiscoveryError::auth(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            return Err(DiscoveryError::auth(format!(
                "token endpoint returned {}: {}",
                status,
                truncate_for_message(&body, PAYLOAD_PREVIEW_CHARS)
            )));
        }

        let token = extract_token(&body)?;
        debug!("Obtained access token from {}", request.token_url);
        Ok(token)
    }
}

fn token_form(request: &TokenRequest) -> Vec<(&'static str, String)> {
    let grant_type = request
        .grant_type
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .unwrap_or(DEFAULT_GRANT_TYPE);

    let mut form = vec![
        ("grant_type", grant_type.to_string()),
        ("client_id", request.client_id.trim().to_string()),
    ];
    if let Some(secret) = request.client_secret.as_ref().filter(|s| !s.is_empty()) {
        form.push(("client_secret", secret.expose().to_string()));
    }
    if let Some(scope) = request.scope.as_deref().filter(|s| !s.trim().is_empty()) {
        form.push(("scope", scope.trim().to_string()));
    }
    form
}

fn extract_token(body: &str) -> Result<AccessToken> {
    let payload: Value = serde_json::from_str(body).map_err(|_| {
        DiscoveryError::auth(format!(
            "token endpoint returned a non-JSON payload: {}",
            truncate_for_message(body, PAYLOAD_PREVIEW_CHARS)
        ))
    })?;

    ["access_token", "token"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .find(|t| !t.is_empty())
        .map(|t| AccessToken(Secret::new(t)))
        .ok_or_else(|| DiscoveryError::auth("token not found in response"))
}
