//! HTTP (REST) and SOAP connector.
//!
//! One request per discovery, optionally preceded by an OAuth2 token
//! exchange. The response is normalized into a JSON tree (XML is converted
//! first), narrowed by the configured response path, and the keys of the
//! first record become the discovered columns.

pub mod token;
pub mod tree;

use crate::config::{ApiSourceConfig, ApiSubtype, AuthDescriptor};
use crate::error::{DiscoveryError, Result, truncate_for_message};
use crate::models::ApiDiscovery;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use token::{AccessToken, TokenExchanger};

/// Characters of an unparsable body kept as preview.
pub const RAW_PREVIEW_CHARS: usize = 500;

const ERROR_BODY_CHARS: usize = 200;

const JSON_CONTENT_TYPE: &str = "application/json";
const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Discovers record fields exposed by an HTTP or SOAP endpoint.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    request_timeout: Duration,
    tokens: TokenExchanger,
}

impl HttpConnector {
    /// Creates a connector sharing `client` for token and main requests.
    pub fn new(client: reqwest::Client, request_timeout: Duration, token_timeout: Duration) -> Self {
        Self {
            tokens: TokenExchanger::new(client.clone(), token_timeout),
            client,
            request_timeout,
        }
    }

    /// Calls the endpoint once and derives columns from the first record.
    ///
    /// An unparsable body is not an error: the outcome has `parsed = false`
    /// and a truncated raw preview.
    ///
    /// # Errors
    /// - `Configuration` for malformed URLs or headers
    /// - `Auth` if the token exchange fails; the endpoint is then not called
    /// - `Timeout` / `Connectivity` for transport failures and non-2xx answers
    pub async fn discover(&self, config: &ApiSourceConfig) -> Result<ApiDiscovery> {
        config.validate()?;
        let url = config.url.trim();
        let method = reqwest::Method::from(config.method);

        info!("Discovering fields from {} {}", method, url);

        let headers = self.request_headers(config).await?;
        let mut request = self
            .client
            .request(method, url)
            .timeout(self.request_timeout)
            .headers(headers);
        if let Some(body) = &config.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DiscoveryError::timeout(format!("request to {}", url), self.request_timeout)
            } else {
                DiscoveryError::connection_failed(format!("request to {} failed: {}", url, e), e)
            }
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| {
            DiscoveryError::connection_failed(format!("failed to read response from {}: {}", url, e), e)
        })?;

        debug!(
            "Received {} ({} bytes, content type {:?}) from {}",
            status,
            body.len(),
            content_type,
            url
        );

        if !status.is_success() {
            return Err(DiscoveryError::unreachable(format!(
                "{} returned {}: {}",
                url,
                status,
                truncate_for_message(&body, ERROR_BODY_CHARS)
            )));
        }

        let tree = match parse_body(content_type.as_deref(), &body) {
            Ok(tree) => tree,
            Err(e) => {
                warn!("Response from {} could not be parsed: {}", url, e);
                return Ok(ApiDiscovery {
                    status_code: status.as_u16(),
                    parsed: false,
                    columns: Vec::new(),
                    preview: None,
                    full_response: Value::String(truncate_for_message(&body, RAW_PREVIEW_CHARS)),
                    resolved_path: Vec::new(),
                    message: format!("Connected to {} but the response could not be parsed: {}", url, e),
                });
            }
        };

        Ok(summarize(status.as_u16(), url, config.response_path.as_deref(), tree))
    }

    async fn request_headers(&self, config: &ApiSourceConfig) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| {
                DiscoveryError::configuration(format!("invalid header name '{}': {}", name, e))
            })?;
            headers.insert(name, header_value(value.trim())?);
        }

        if config.body.is_some() && !headers.contains_key(header::CONTENT_TYPE) {
            let content_type = match config.subtype {
                ApiSubtype::Rest => JSON_CONTENT_TYPE,
                ApiSubtype::Soap => SOAP_CONTENT_TYPE,
            };
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        if let Some(authorization) = self.authorization(&config.auth).await? {
            let mut value = header_value(&authorization)?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        Ok(headers)
    }

    async fn authorization(&self, auth: &AuthDescriptor) -> Result<Option<String>> {
        match auth {
            AuthDescriptor::None => Ok(None),
            AuthDescriptor::Basic { username, password } => {
                let credentials = format!("{}:{}", username, password.expose());
                Ok(Some(format!("Basic {}", base64_encode(credentials))))
            }
            AuthDescriptor::Bearer { token } => Ok(Some(format!("Bearer {}", token.expose()))),
            AuthDescriptor::DynamicBearer(request) => {
                let token = self.tokens.fetch_token(request).await?;
                Ok(Some(format!("Bearer {}", token.expose())))
            }
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| DiscoveryError::configuration("header value contains invalid characters"))
}

fn base64_encode(data: impl AsRef<[u8]>) -> String {
    use base64::{Engine, engine::general_purpose::STANDARD};
    STANDARD.encode(data)
}

/// Parses a body as XML or JSON depending on content type and leading byte.
///
/// # Errors
/// Returns `Parse` if the body is not valid in the detected format
pub fn parse_body(content_type: Option<&str>, body: &str) -> Result<Value> {
    if tree::looks_like_xml(content_type, body) {
        tree::xml_to_value(body)
    } else {
        serde_json::from_str(body)
            .map_err(|e| DiscoveryError::parse(format!("invalid JSON: {}", e)))
    }
}

fn summarize(status_code: u16, url: &str, response_path: Option<&str>, tree: Value) -> ApiDiscovery {
    let narrowed = tree::narrow(&tree, response_path);
    if let Some(missing) = &narrowed.missing {
        warn!(
            "Response path segment '{}' not found in response from {}; using '{}'",
            missing,
            url,
            narrowed.resolved.join(".")
        );
    }

    let records = tree::find_records(narrowed.node);
    let first = records.first().copied();
    let columns = first.map(tree::record_fields).unwrap_or_default();
    let preview = first.cloned();

    let mut message = format!(
        "Connected to {} and detected {} fields",
        url,
        columns.len()
    );
    if let Some(missing) = &narrowed.missing {
        message.push_str(&format!(" (path segment '{}' not found)", missing));
    }

    info!("Detected {} fields from {}", columns.len(), url);

    let resolved_path = narrowed.resolved;
    ApiDiscovery {
        status_code,
        parsed: true,
        columns,
        preview,
        full_response: tree,
        resolved_path,
        message,
    }
}
