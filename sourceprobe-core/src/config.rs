//! Source definitions and discovery settings.
//!
//! A [`ConnectionConfig`] is supplied fresh by the caller for every
//! discovery call; nothing in this module is persisted. [`DiscoverySettings`]
//! carries the process-level knobs (data root and timeouts) and is owned by
//! the [`DiscoveryService`](crate::service::DiscoveryService).

use crate::error::{DiscoveryError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default database connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default HTTP discovery request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default OAuth2 token request timeout.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Credential material that is zeroized on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a credential value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when no credential was supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Timeouts bounding every blocking point of a discovery call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Database connect timeout
    pub connect: Duration,
    /// HTTP discovery request timeout
    pub request: Duration,
    /// OAuth2 token exchange timeout
    pub token: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            request: DEFAULT_REQUEST_TIMEOUT,
            token: DEFAULT_TOKEN_TIMEOUT,
        }
    }
}

/// Process-level settings for the discovery service.
///
/// # Example
/// ```rust
/// use sourceprobe_core::config::DiscoverySettings;
/// use std::time::Duration;
///
/// let settings = DiscoverySettings::new("/srv/sources")
///     .with_connect_timeout(Duration::from_secs(3));
///
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Root under which file source directories are resolved
    pub data_root: PathBuf,
    /// Timeouts applied to database, HTTP and token calls
    pub timeouts: Timeouts,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            timeouts: Timeouts::default(),
        }
    }
}

impl DiscoverySettings {
    /// Creates settings rooted at `data_root` with default timeouts.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the database connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    /// Builder method to set the HTTP request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request = timeout;
        self
    }

    /// Builder method to set the token exchange timeout.
    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.token = timeout;
        self
    }

    /// Validates settings.
    ///
    /// # Errors
    /// Returns error if the data root is empty or a timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.data_root.as_os_str().is_empty() {
            return Err(DiscoveryError::configuration("data_root cannot be empty"));
        }

        for (name, timeout) in [
            ("connect_timeout", self.timeouts.connect),
            ("request_timeout", self.timeouts.request),
            ("token_timeout", self.timeouts.token),
        ] {
            if timeout.is_zero() {
                return Err(DiscoveryError::configuration(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Administrator-supplied description of one data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionConfig {
    /// Directory holding exactly one delimited file
    File(FileSourceConfig),
    /// Relational table
    Database(DatabaseSourceConfig),
    /// HTTP (REST) or SOAP endpoint
    Api(ApiSourceConfig),
}

impl ConnectionConfig {
    /// Source kind label used in logs and results.
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::File(_) => SourceKind::File,
            Self::Database(_) => SourceKind::Database,
            Self::Api(_) => SourceKind::Api,
        }
    }

    /// Validates the kind-specific fields.
    ///
    /// # Errors
    /// Returns a configuration error naming the field to correct
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::File(config) => config.validate(),
            Self::Database(config) => config.validate(),
            Self::Api(config) => config.validate(),
        }
    }
}

/// Source kinds understood by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    /// Delimited file in a directory
    File,
    /// Relational table
    Database,
    /// HTTP or SOAP endpoint
    Api,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::File => write!(f, "FILE"),
            SourceKind::Database => write!(f, "DATABASE"),
            SourceKind::Api => write!(f, "API"),
        }
    }
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_quote() -> String {
    "\"".to_string()
}

/// Delimited-file source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSourceConfig {
    /// Directory, relative to the data root
    pub directory: String,
    /// Field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Quote characters stripped from each header token
    #[serde(default = "default_quote")]
    pub quote: String,
}

impl FileSourceConfig {
    /// Creates a file source with the default delimiter and quote.
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            delimiter: default_delimiter(),
            quote: default_quote(),
        }
    }

    /// Builder method to set the delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Builder method to set the quote character.
    pub fn with_quote(mut self, quote: impl Into<String>) -> Self {
        self.quote = quote.into();
        self
    }

    /// Validates the file source.
    ///
    /// # Errors
    /// Returns error if the directory or delimiter is empty
    pub fn validate(&self) -> Result<()> {
        if self.directory.trim().is_empty() {
            return Err(DiscoveryError::configuration("directory is required"));
        }
        if self.delimiter.is_empty() {
            return Err(DiscoveryError::configuration("delimiter cannot be empty"));
        }
        Ok(())
    }
}

/// SQL dialects accepted in source definitions.
///
/// Only PostgreSQL and Oracle are queried; MySQL and SQL Server are accepted
/// so definitions round-trip through the UI, and are rejected at discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL
    #[serde(alias = "postgresql")]
    Postgres,
    /// Oracle Database
    Oracle,
    /// MySQL or MariaDB (not queried)
    #[serde(alias = "mariadb")]
    Mysql,
    /// Microsoft SQL Server (not queried)
    #[serde(alias = "mssql")]
    Sqlserver,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "PostgreSQL"),
            Dialect::Oracle => write!(f, "Oracle"),
            Dialect::Mysql => write!(f, "MySQL"),
            Dialect::Sqlserver => write!(f, "SQL Server"),
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "oracle" => Ok(Self::Oracle),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "sqlserver" | "mssql" => Ok(Self::Sqlserver),
            other => Err(DiscoveryError::configuration(format!(
                "unknown database type '{}'",
                other
            ))),
        }
    }
}

impl Dialect {
    /// Default TCP port of the dialect's server.
    pub fn default_port(self) -> u16 {
        match self {
            Dialect::Postgres => 5432,
            Dialect::Oracle => 1521,
            Dialect::Mysql => 3306,
            Dialect::Sqlserver => 1433,
        }
    }

    /// Normalizes an identifier to the case the dialect's catalog stores.
    ///
    /// Oracle catalogs are upper-case, PostgreSQL catalogs lower-case.
    pub fn normalize_identifier(self, identifier: &str) -> String {
        let identifier = identifier.trim();
        match self {
            Dialect::Oracle => identifier.to_uppercase(),
            Dialect::Postgres => identifier.to_lowercase(),
            Dialect::Mysql | Dialect::Sqlserver => identifier.to_string(),
        }
    }

    /// Schema used when the definition names none.
    pub fn default_schema(self, user: Option<&str>) -> Option<String> {
        match self {
            Dialect::Postgres => Some("public".to_string()),
            Dialect::Oracle => user.map(|u| u.trim().to_uppercase()),
            Dialect::Mysql => None,
            Dialect::Sqlserver => Some("dbo".to_string()),
        }
    }

    /// True for dialects this crate can actually query.
    pub fn is_queryable(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Oracle)
    }
}

/// How to reach a database server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseTarget {
    /// Discrete connection fields
    Host {
        /// Server host name or address
        host: String,
        /// Server port, the dialect default when absent
        #[serde(default)]
        port: Option<u16>,
        /// Login user
        #[serde(default)]
        user: Option<String>,
        /// Login password
        #[serde(default)]
        password: Option<Secret>,
        /// Database name (PostgreSQL) or service name (Oracle)
        #[serde(default)]
        database: Option<String>,
    },
    /// Connection string used verbatim
    Url {
        /// Connection URL or Oracle descriptor
        url: String,
        /// Used when the connection string carries no credentials
        #[serde(default)]
        user: Option<String>,
        /// Used when the connection string carries no password
        #[serde(default)]
        password: Option<Secret>,
    },
}

impl DatabaseTarget {
    /// Host-mode target with no credentials.
    pub fn host(host: impl Into<String>) -> Self {
        Self::Host {
            host: host.into(),
            port: None,
            user: None,
            password: None,
            database: None,
        }
    }

    /// URL-mode target.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url {
            url: url.into(),
            user: None,
            password: None,
        }
    }

    /// The user the connection authenticates as, if known before connecting.
    pub fn user(&self) -> Option<String> {
        match self {
            Self::Host { user, .. } => user.clone(),
            Self::Url { url, user, .. } => url::Url::parse(url)
                .ok()
                .map(|u| decode_url_credential(u.username()))
                .filter(|u| !u.is_empty())
                .or_else(|| user.clone()),
        }
    }
}

/// Percent-decodes a user or password taken from a connection URL.
///
/// Text that does not decode to UTF-8 is returned as written.
pub(crate) fn decode_url_credential(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |decoded| decoded.into_owned())
}

impl std::fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host {
                host,
                port,
                database,
                ..
            } => write!(
                f,
                "{}{}{}",
                host,
                port.map_or_else(String::new, |p| format!(":{}", p)),
                database
                    .as_ref()
                    .map_or_else(String::new, |db| format!("/{}", db))
            ),
            // Intentionally never include credentials
            Self::Url { url, .. } => write!(f, "{}", crate::error::redact_database_url(url)),
        }
    }
}

/// Relational table source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSourceConfig {
    /// SQL dialect
    pub dialect: Dialect,
    /// Connection target
    pub connection: DatabaseTarget,
    /// Target schema; defaulted per dialect when absent
    #[serde(default)]
    pub schema: Option<String>,
    /// Target table; required for discovery
    #[serde(default)]
    pub table: Option<String>,
}

impl DatabaseSourceConfig {
    /// Creates a database source with no schema or table.
    pub fn new(dialect: Dialect, connection: DatabaseTarget) -> Self {
        Self {
            dialect,
            connection,
            schema: None,
            table: None,
        }
    }

    /// Builder method to set the schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Builder method to set the table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Port to use, falling back to the dialect default.
    pub fn effective_port(&self) -> u16 {
        match &self.connection {
            DatabaseTarget::Host { port: Some(p), .. } => *p,
            _ => self.dialect.default_port(),
        }
    }

    /// Schema to query, normalized for the dialect.
    pub fn effective_schema(&self) -> Option<String> {
        self.schema
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| self.dialect.normalize_identifier(s))
            .or_else(|| {
                self.dialect
                    .default_schema(self.connection.user().as_deref())
            })
    }

    /// Table to query, normalized for the dialect.
    pub fn effective_table(&self) -> Option<String> {
        self.table
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| self.dialect.normalize_identifier(t))
    }

    /// Validates the connection fields (the table is checked by discovery).
    ///
    /// # Errors
    /// Returns error if host or URL is missing or the port is zero
    pub fn validate(&self) -> Result<()> {
        match &self.connection {
            DatabaseTarget::Host { host, port, .. } => {
                if host.trim().is_empty() {
                    return Err(DiscoveryError::configuration("host is required"));
                }
                if *port == Some(0) {
                    return Err(DiscoveryError::configuration(
                        "port must be greater than 0",
                    ));
                }
            }
            DatabaseTarget::Url { url, .. } => {
                if url.trim().is_empty() {
                    return Err(DiscoveryError::configuration(
                        "connection url is required",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// HTTP methods accepted for API sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl std::str::FromStr for HttpMethod {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(DiscoveryError::configuration(format!(
                "unsupported HTTP method '{}'",
                other
            ))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// API flavor; decides the default request content type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiSubtype {
    /// JSON over HTTP
    #[default]
    Rest,
    /// XML envelope over HTTP
    Soap,
}

/// OAuth2 client-credentials exchange parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Token endpoint
    pub token_url: String,
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    #[serde(default)]
    pub client_secret: Option<Secret>,
    /// Grant type, `client_credentials` when absent
    #[serde(default)]
    pub grant_type: Option<String>,
    /// Requested scope
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenRequest {
    /// Creates a token request with only the required fields.
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            grant_type: None,
            scope: None,
        }
    }

    /// Builder method to set the client secret.
    pub fn with_client_secret(mut self, secret: impl Into<Secret>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Builder method to set the scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Authentication descriptor of an API source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthDescriptor {
    /// Only the declared static headers are sent
    #[default]
    None,
    /// HTTP Basic
    Basic {
        /// Basic auth user
        username: String,
        /// Basic auth password
        password: Secret,
    },
    /// Statically configured bearer token
    Bearer {
        /// Token sent after `Bearer `
        token: Secret,
    },
    /// Bearer token obtained through an OAuth2 exchange before each call
    DynamicBearer(TokenRequest),
}

/// HTTP (REST) or SOAP source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSourceConfig {
    /// Endpoint URL
    pub url: String,
    /// HTTP method
    #[serde(default)]
    pub method: HttpMethod,
    /// REST or SOAP
    #[serde(default)]
    pub subtype: ApiSubtype,
    /// Static request headers, sent in declaration order
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Optional request body (SOAP envelope or JSON)
    #[serde(default)]
    pub body: Option<String>,
    /// Dot-separated path locating the record list in the response
    #[serde(default)]
    pub response_path: Option<String>,
    /// Authentication descriptor
    #[serde(default)]
    pub auth: AuthDescriptor,
}

impl ApiSourceConfig {
    /// Creates a GET REST source with no auth.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            subtype: ApiSubtype::Rest,
            headers: IndexMap::new(),
            body: None,
            response_path: None,
            auth: AuthDescriptor::None,
        }
    }

    /// Builder method to set the method.
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Builder method to set the subtype.
    pub fn with_subtype(mut self, subtype: ApiSubtype) -> Self {
        self.subtype = subtype;
        self
    }

    /// Builder method to add a static header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Builder method to set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Builder method to set the response path.
    pub fn with_response_path(mut self, path: impl Into<String>) -> Self {
        self.response_path = Some(path.into());
        self
    }

    /// Builder method to set the auth descriptor.
    pub fn with_auth(mut self, auth: AuthDescriptor) -> Self {
        self.auth = auth;
        self
    }

    /// Validates the API source.
    ///
    /// # Errors
    /// Returns error if the endpoint or token URL is missing or malformed
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(DiscoveryError::configuration("endpoint url is required"));
        }
        url::Url::parse(self.url.trim()).map_err(|e| {
            DiscoveryError::configuration(format!("invalid endpoint url: {}", e))
        })?;

        if let AuthDescriptor::DynamicBearer(token) = &self.auth {
            if token.token_url.trim().is_empty() {
                return Err(DiscoveryError::configuration("token url is required"));
            }
            url::Url::parse(token.token_url.trim()).map_err(|e| {
                DiscoveryError::configuration(format!("invalid token url: {}", e))
            })?;
            if token.client_id.trim().is_empty() {
                return Err(DiscoveryError::configuration("client id is required"));
            }
        }

        Ok(())
    }
}
