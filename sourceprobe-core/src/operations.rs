//! Boundary operations used by the field-mapping screen.
//!
//! Each operation takes a flat wire request (camelCase, plus the legacy
//! `auth_*` keys for HTTP sources), runs one discovery through the
//! [`DiscoveryService`] and answers either a typed response or an
//! [`OperationFailure`] carrying an HTTP-style status.

use crate::config::{
    ApiSourceConfig, ApiSubtype, AuthDescriptor, DatabaseSourceConfig, DatabaseTarget, Dialect,
    FileSourceConfig, HttpMethod, Secret, TokenRequest,
};
use crate::error::DiscoveryError;
use crate::models::ApiDiscovery;
use crate::service::DiscoveryService;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure answer of every operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} (status {status})")]
pub struct OperationFailure {
    /// HTTP-style classification
    pub status: u16,
    /// Human-readable diagnostic
    pub message: String,
}

impl From<DiscoveryError> for OperationFailure {
    fn from(error: DiscoveryError) -> Self {
        Self {
            status: error.status_code(),
            message: error.to_string(),
        }
    }
}

/// Result alias for boundary operations.
pub type OperationResult<T> = std::result::Result<T, OperationFailure>;

/// Request of [`test_file_source`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTestRequest {
    /// Directory under the data root
    pub directory: String,
    /// Field separator, `,` when absent or empty
    #[serde(default)]
    pub delimiter: Option<String>,
    /// Characters stripped from every token
    #[serde(default)]
    pub quote: Option<String>,
}

impl From<FileTestRequest> for FileSourceConfig {
    fn from(request: FileTestRequest) -> Self {
        let mut config = FileSourceConfig::new(request.directory);
        if let Some(delimiter) = request.delimiter.filter(|d| !d.is_empty()) {
            config = config.with_delimiter(delimiter);
        }
        if let Some(quote) = request.quote {
            config = config.with_quote(quote);
        }
        config
    }
}

/// Answer of [`test_file_source`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTestResponse {
    /// Always true; failures are reported as [`OperationFailure`]
    pub success: bool,
    /// Column names in file order
    pub header: Vec<String>,
    /// Number of columns in `header`
    pub detected_column_count: usize,
    /// Name of the file the header came from
    pub file_name: String,
    /// First data row keyed by column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Value>,
}

/// Reads the header of the single delimited file in `request.directory`.
///
/// # Errors
/// Returns a failure with status 400, 404 or 409 for configuration, missing
/// and ambiguous sources
pub async fn test_file_source(
    service: &DiscoveryService,
    request: FileTestRequest,
) -> OperationResult<FileTestResponse> {
    let header = service.discover_file(&request.into()).await.map_err(log_failure)?;

    Ok(FileTestResponse {
        success: true,
        detected_column_count: header.columns.len(),
        header: header.columns,
        file_name: header.file_name,
        sample: header.sample.map(Value::Object),
    })
}

/// How the relational request describes its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionType {
    /// Host, port and database fields
    #[default]
    Host,
    /// A single connection string
    Url,
}

/// Request of [`test_relational_source`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationalTestRequest {
    /// Which of the target fields apply
    #[serde(default)]
    pub connection_type: ConnectionType,
    /// Server host (HOST mode)
    #[serde(default)]
    pub host: Option<String>,
    /// Server port, the dialect default when absent (HOST mode)
    #[serde(default)]
    pub port: Option<u16>,
    /// Login user
    #[serde(default)]
    pub user: Option<String>,
    /// Login password
    #[serde(default)]
    pub password: Option<Secret>,
    /// Database or Oracle service name (HOST mode)
    #[serde(default)]
    pub database: Option<String>,
    /// Connection string (URL mode)
    #[serde(default)]
    pub url: Option<String>,
    /// Database type
    #[serde(rename = "type")]
    pub dialect: Dialect,
    /// Schema holding the table
    #[serde(default)]
    pub schema: Option<String>,
    /// Table to list; connectivity only when absent
    #[serde(default)]
    pub table: Option<String>,
}

impl RelationalTestRequest {
    fn into_config(self) -> DatabaseSourceConfig {
        let connection = match self.connection_type {
            ConnectionType::Host => DatabaseTarget::Host {
                host: self.host.unwrap_or_default(),
                port: self.port,
                user: self.user,
                password: self.password,
                database: self.database,
            },
            ConnectionType::Url => DatabaseTarget::Url {
                url: self.url.unwrap_or_default(),
                user: self.user,
                password: self.password,
            },
        };

        DatabaseSourceConfig {
            dialect: self.dialect,
            connection,
            schema: self.schema,
            table: self.table,
        }
    }
}

/// Answer of [`test_relational_source`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationalTestResponse {
    /// Human-readable summary
    pub message: String,
    /// Server clock as reported by the database
    pub server_time: String,
    /// Empty when no table was requested
    pub columns: Vec<String>,
}

/// Connects to a database and, when a table is named, lists its columns.
///
/// Without a table only connectivity and the server clock are checked.
///
/// # Errors
/// Returns a failure with status 400, 404, 502 or 504
pub async fn test_relational_source(
    service: &DiscoveryService,
    request: RelationalTestRequest,
) -> OperationResult<RelationalTestResponse> {
    let config = request.into_config();

    if config.effective_table().is_none() {
        let probe = service.probe_database(&config).await.map_err(log_failure)?;
        return Ok(RelationalTestResponse {
            message: format!("Connected to {}", probe.dialect),
            server_time: probe.server_time,
            columns: Vec::new(),
        });
    }

    let table = service.discover_table(&config).await.map_err(log_failure)?;
    Ok(RelationalTestResponse {
        message: format!(
            "Connected to {}, found {} columns in \"{}\".\"{}\"",
            table.dialect,
            table.columns.len(),
            table.schema,
            table.table
        ),
        server_time: table.server_time,
        columns: table.columns,
    })
}

/// Request of [`test_http_source`].
///
/// The `auth_*` fields keep their snake_case wire names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTestRequest {
    /// Endpoint URL
    pub api_url: String,
    /// HTTP method name, GET when absent
    #[serde(default)]
    pub method: Option<String>,
    /// Static headers, sent in declaration order
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Request body; an empty body is not sent
    #[serde(default)]
    pub body: Option<String>,
    /// Dot-separated path to the record list
    #[serde(default)]
    pub response_path: Option<String>,
    /// REST or SOAP, REST when absent
    #[serde(default)]
    pub api_type: Option<ApiSubtype>,
    /// Fetch a bearer token before the call
    #[serde(default, rename = "auth_is_dynamic")]
    pub auth_is_dynamic: bool,
    /// Token endpoint
    #[serde(default, rename = "auth_token_url")]
    pub auth_token_url: Option<String>,
    /// OAuth2 client id
    #[serde(default, rename = "auth_client_id")]
    pub auth_client_id: Option<String>,
    /// OAuth2 client secret
    #[serde(default, rename = "auth_client_secret")]
    pub auth_client_secret: Option<Secret>,
    /// OAuth2 grant type, `client_credentials` when absent
    #[serde(default, rename = "auth_grant_type")]
    pub auth_grant_type: Option<String>,
    /// OAuth2 scope
    #[serde(default, rename = "auth_scope")]
    pub auth_scope: Option<String>,
}

impl TryFrom<HttpTestRequest> for ApiSourceConfig {
    type Error = DiscoveryError;

    fn try_from(request: HttpTestRequest) -> Result<Self, Self::Error> {
        let method = request
            .method
            .as_deref()
            .map(str::parse::<HttpMethod>)
            .transpose()?
            .unwrap_or_default();

        let auth = if request.auth_is_dynamic {
            AuthDescriptor::DynamicBearer(TokenRequest {
                token_url: request.auth_token_url.unwrap_or_default(),
                client_id: request.auth_client_id.unwrap_or_default(),
                client_secret: request.auth_client_secret,
                grant_type: request.auth_grant_type,
                scope: request.auth_scope,
            })
        } else {
            AuthDescriptor::None
        };

        Ok(ApiSourceConfig {
            url: request.api_url,
            method,
            subtype: request.api_type.unwrap_or_default(),
            headers: request.headers,
            body: request.body.filter(|b| !b.is_empty()),
            response_path: request.response_path,
            auth,
        })
    }
}

/// Answer of [`test_http_source`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTestResponse {
    /// Human-readable summary
    pub message: String,
    /// Field names of the first record
    pub detected_columns: Vec<String>,
    /// First record
    pub preview: Option<Value>,
    /// Parsed tree, or a truncated raw body when it could not be parsed
    pub full_response: Value,
}

impl From<ApiDiscovery> for HttpTestResponse {
    fn from(outcome: ApiDiscovery) -> Self {
        Self {
            message: outcome.message,
            detected_columns: outcome.columns,
            preview: outcome.preview,
            full_response: outcome.full_response,
        }
    }
}

/// Calls an HTTP or SOAP endpoint and reports the fields of its first record.
///
/// An unparsable response is still answered successfully, with no columns
/// and the raw body preview in `fullResponse`.
///
/// # Errors
/// Returns a failure with status 400, 401, 502 or 504
pub async fn test_http_source(
    service: &DiscoveryService,
    request: HttpTestRequest,
) -> OperationResult<HttpTestResponse> {
    let config = ApiSourceConfig::try_from(request).map_err(log_failure)?;
    let outcome = service.discover_api(&config).await.map_err(log_failure)?;
    Ok(outcome.into())
}

fn log_failure(error: DiscoveryError) -> OperationFailure {
    tracing::error!("Source test failed: {}", error);
    error.into()
}
