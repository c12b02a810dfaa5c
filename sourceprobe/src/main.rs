//! Data-source connectivity and field discovery tool.
//!
//! Reaches a delimited file, a relational table or an HTTP/SOAP endpoint
//! once and prints the discovered field names as JSON on stdout. Logs go to
//! stderr. The exit status is non-zero when discovery fails.
//!
//! # Security Guarantees
//! - Read-only: files are only read, SQL is catalog queries only
//! - Passwords, secrets and tokens are never logged or printed

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sourceprobe_core::logging::init_logging;
use sourceprobe_core::operations::{
    ConnectionType, FileTestRequest, HttpTestResponse, OperationFailure, OperationResult,
    RelationalTestRequest, test_file_source, test_relational_source,
};
use sourceprobe_core::{
    ApiSourceConfig, ApiSubtype, AuthDescriptor, ConnectionConfig, Dialect, DiscoveryService,
    DiscoverySettings, HttpMethod, Secret, SourceKind, TokenRequest,
};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "sourceprobe")]
#[command(about = "Data-source connectivity checks and field discovery")]
#[command(version)]
#[command(long_about = "
sourceprobe - connectivity checks and field discovery for data sources

Connects to a source once and prints the ordered field names it exposes:
- FILE: header of the single .csv file in a directory under the data root
- DATABASE: columns of a PostgreSQL or Oracle table, in catalog order
- API: keys of the first record returned by a REST or SOAP endpoint

SECURITY FEATURES:
- Read-only operations only
- No credentials stored or logged

EXAMPLES:
  sourceprobe --data-root /srv/imports file hr --delimiter ';'
  sourceprobe database --type postgres --url postgres://reader@db/iam --table users
  sourceprobe api https://api.example.com/users --response-path data.results
  sourceprobe discover source.json
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Read the header of the single delimited file in a directory
    File(FileArgs),
    /// Test a database connection and list the columns of a table
    Database(DatabaseArgs),
    /// Call an HTTP or SOAP endpoint and list the fields of its first record
    Api(ApiArgs),
    /// Run discovery on a JSON source definition
    Discover(DiscoverArgs),
    /// List supported source kinds and database types
    List,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all log output except errors")]
    pub quiet: bool,
}

#[derive(Args)]
pub struct SettingsArgs {
    /// Root directory for file sources
    #[arg(long, env = "SOURCEPROBE_DATA_ROOT", default_value = ".")]
    pub data_root: PathBuf,

    /// Database connect timeout in seconds
    #[arg(long, env = "SOURCEPROBE_CONNECT_TIMEOUT", default_value_t = 5, value_name = "SECS")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "SOURCEPROBE_REQUEST_TIMEOUT", default_value_t = 10, value_name = "SECS")]
    pub request_timeout: u64,

    /// OAuth2 token request timeout in seconds
    #[arg(long, env = "SOURCEPROBE_TOKEN_TIMEOUT", default_value_t = 5, value_name = "SECS")]
    pub token_timeout: u64,
}

impl SettingsArgs {
    fn to_settings(&self) -> DiscoverySettings {
        DiscoverySettings::new(self.data_root.clone())
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_request_timeout(Duration::from_secs(self.request_timeout))
            .with_token_timeout(Duration::from_secs(self.token_timeout))
    }
}

#[derive(Args)]
pub struct FileArgs {
    /// Directory relative to the data root
    pub directory: String,

    /// Field delimiter
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Quote character stripped from fields
    #[arg(long)]
    pub quote: Option<String>,
}

#[derive(Args)]
pub struct DatabaseArgs {
    /// Database type (postgres, oracle)
    #[arg(long = "type", value_name = "TYPE")]
    pub dialect: Dialect,

    /// Connection string, used verbatim
    #[arg(
        long,
        env = "SOURCEPROBE_DATABASE_URL",
        conflicts_with = "host",
        help = "Connection string (credentials will be sanitized in logs)"
    )]
    pub url: Option<String>,

    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (dialect default when omitted)
    #[arg(long)]
    pub port: Option<u16>,

    /// User to connect as
    #[arg(long)]
    pub user: Option<String>,

    /// Password
    #[arg(long, env = "SOURCEPROBE_DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database name (PostgreSQL) or service name (Oracle)
    #[arg(long)]
    pub database: Option<String>,

    /// Schema (public for PostgreSQL, the user for Oracle when omitted)
    #[arg(long)]
    pub schema: Option<String>,

    /// Table; without it only connectivity is checked
    #[arg(long)]
    pub table: Option<String>,
}

impl From<DatabaseArgs> for RelationalTestRequest {
    fn from(args: DatabaseArgs) -> Self {
        Self {
            connection_type: if args.url.is_some() {
                ConnectionType::Url
            } else {
                ConnectionType::Host
            },
            host: args.host,
            port: args.port,
            user: args.user,
            password: args.password.map(Secret::from),
            database: args.database,
            url: args.url,
            dialect: args.dialect,
            schema: args.schema,
            table: args.table,
        }
    }
}

#[derive(Args)]
pub struct ApiArgs {
    /// Endpoint URL
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: HttpMethod,

    /// API flavor (rest, soap); decides the default content type
    #[arg(long = "api-type", default_value = "rest", value_parser = parse_api_type)]
    pub api_type: ApiSubtype,

    /// Static request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the request body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Dot-separated path to the record list in the response
    #[arg(long)]
    pub response_path: Option<String>,

    /// Static bearer token
    #[arg(
        long,
        env = "SOURCEPROBE_BEARER_TOKEN",
        hide_env_values = true,
        conflicts_with_all = ["basic_user", "token_url"]
    )]
    pub bearer_token: Option<String>,

    /// HTTP Basic user
    #[arg(long, conflicts_with = "token_url")]
    pub basic_user: Option<String>,

    /// HTTP Basic password
    #[arg(
        long,
        env = "SOURCEPROBE_BASIC_PASSWORD",
        hide_env_values = true,
        requires = "basic_user"
    )]
    pub basic_password: Option<String>,

    /// OAuth2 token endpoint; enables the client-credentials exchange
    #[arg(long, requires = "client_id")]
    pub token_url: Option<String>,

    /// OAuth2 client id
    #[arg(long, requires = "token_url")]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[arg(
        long,
        env = "SOURCEPROBE_CLIENT_SECRET",
        hide_env_values = true,
        requires = "token_url"
    )]
    pub client_secret: Option<String>,

    /// OAuth2 grant type (client_credentials when omitted)
    #[arg(long, requires = "token_url")]
    pub grant_type: Option<String>,

    /// OAuth2 scope
    #[arg(long, requires = "token_url")]
    pub scope: Option<String>,
}

impl ApiArgs {
    fn auth(&self) -> AuthDescriptor {
        if let (Some(token_url), Some(client_id)) = (&self.token_url, &self.client_id) {
            return AuthDescriptor::DynamicBearer(TokenRequest {
                token_url: token_url.clone(),
                client_id: client_id.clone(),
                client_secret: self.client_secret.clone().map(Secret::from),
                grant_type: self.grant_type.clone(),
                scope: self.scope.clone(),
            });
        }
        if let Some(token) = &self.bearer_token {
            return AuthDescriptor::Bearer {
                token: Secret::new(token.as_str()),
            };
        }
        if let Some(username) = &self.basic_user {
            return AuthDescriptor::Basic {
                username: username.clone(),
                password: Secret::new(self.basic_password.clone().unwrap_or_default()),
            };
        }
        AuthDescriptor::None
    }

    fn to_config(&self) -> anyhow::Result<ApiSourceConfig> {
        let body = match &self.body_file {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read request body from {}", path.display()))?,
            ),
            None => self.body.clone(),
        };

        Ok(ApiSourceConfig {
            url: self.url.clone(),
            method: self.method,
            subtype: self.api_type,
            headers: self.headers.iter().cloned().collect(),
            body,
            response_path: self.response_path.clone(),
            auth: self.auth(),
        })
    }
}

#[derive(Args)]
pub struct DiscoverArgs {
    /// JSON source definition file, or `-` for stdin
    pub config: String,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name cannot be empty".to_string());
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_api_type(raw: &str) -> Result<ApiSubtype, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "rest" => Ok(ApiSubtype::Rest),
        "soap" => Ok(ApiSubtype::Soap),
        other => Err(format!("unknown API type '{}', expected rest or soap", other)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    let service = DiscoveryService::new(cli.settings.to_settings())?;
    debug!(
        "Data root {}, request timeout {}s",
        service.settings().data_root.display(),
        service.settings().timeouts.request.as_secs()
    );

    match cli.command {
        Command::File(args) => {
            let request = FileTestRequest {
                directory: args.directory,
                delimiter: args.delimiter,
                quote: args.quote,
            };
            emit(test_file_source(&service, request).await)
        }
        Command::Database(args) => emit(test_relational_source(&service, args.into()).await),
        Command::Api(args) => {
            let config = args.to_config()?;
            emit(discover_api(&service, &config).await)
        }
        Command::Discover(args) => discover_definition(&service, &args.config).await,
        Command::List => {
            print_json(&supported_sources())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn discover_api(
    service: &DiscoveryService,
    config: &ApiSourceConfig,
) -> OperationResult<HttpTestResponse> {
    service
        .discover_api(config)
        .await
        .map(HttpTestResponse::from)
        .map_err(|e| {
            error!("API discovery failed: {}", e);
            OperationFailure::from(e)
        })
}

/// Runs the facade on a serialized source definition
async fn discover_definition(service: &DiscoveryService, source: &str) -> anyhow::Result<ExitCode> {
    let raw = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read source definition from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read source definition from {}", source))?
    };

    let config: ConnectionConfig =
        serde_json::from_str(&raw).context("Invalid source definition")?;
    info!("Discovering {} source", config.kind());

    let result = service.discover(&config).await;
    if result.success && result.is_empty() {
        warn!("{} source answered but exposes no fields to map", result.kind);
    }
    print_json(&result)?;

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SupportedSources {
    source_kinds: Vec<SourceKind>,
    databases: Vec<SupportedDatabase>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SupportedDatabase {
    #[serde(rename = "type")]
    dialect: Dialect,
    name: String,
    default_port: u16,
    available: bool,
}

fn supported_sources() -> SupportedSources {
    let databases = [
        (Dialect::Postgres, cfg!(feature = "postgresql")),
        (Dialect::Oracle, cfg!(feature = "oracle")),
        (Dialect::Mysql, false),
        (Dialect::Sqlserver, false),
    ]
    .into_iter()
    .map(|(dialect, compiled)| SupportedDatabase {
        dialect,
        name: dialect.to_string(),
        default_port: dialect.default_port(),
        available: compiled && dialect.is_queryable(),
    })
    .collect();

    SupportedSources {
        source_kinds: vec![SourceKind::File, SourceKind::Database, SourceKind::Api],
        databases,
    }
}

fn emit<T: Serialize>(outcome: OperationResult<T>) -> anyhow::Result<ExitCode> {
    match outcome {
        Ok(response) => {
            print_json(&response)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            print_json(&failure)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}
