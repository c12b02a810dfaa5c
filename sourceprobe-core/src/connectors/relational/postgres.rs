//! PostgreSQL catalog lister.
//!
//! Uses a single `PgConnection` (no pool) and `information_schema` views.
//! Identifiers are expected lower-case, as PostgreSQL folds unquoted names.

use super::ColumnLister;
use crate::config::{DatabaseSourceConfig, DatabaseTarget, Dialect};
use crate::error::{DiscoveryError, Result, redact_database_url};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::str::FromStr;
use std::time::Duration;

const TABLE_EXISTS_QUERY: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = $1 AND table_name = $2";

const LIST_COLUMNS_QUERY: &str = "SELECT column_name::text FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

const LIVENESS_QUERY: &str = "SELECT NOW()";

/// Lister over one open PostgreSQL connection.
pub struct PostgresLister {
    conn: PgConnection,
}

impl std::fmt::Debug for PostgresLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresLister").finish_non_exhaustive()
    }
}

impl PostgresLister {
    /// Opens a connection within `timeout`.
    ///
    /// # Errors
    /// - `Configuration` if the connection URL cannot be parsed
    /// - `Timeout` if the server does not answer in time
    /// - `Connectivity` carrying the driver message otherwise
    pub async fn connect(config: &DatabaseSourceConfig, timeout: Duration) -> Result<Self> {
        let options = connect_options(config)?;
        let target = config.connection.to_string();

        tracing::debug!("Opening PostgreSQL connection to {}", target);

        let conn = tokio::time::timeout(timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                DiscoveryError::timeout(format!("PostgreSQL connect to {}", target), timeout)
            })?
            .map_err(|e| {
                DiscoveryError::connection_failed(
                    format!("PostgreSQL connection to {} failed: {}", target, e),
                    e,
                )
            })?;

        Ok(Self { conn })
    }
}

/// Builds driver options from the configured target.
///
/// `URL` targets are handed to the driver verbatim; `HOST` targets are
/// composed from discrete parameters with the default port 5432.
///
/// # Errors
/// Returns `Configuration` if a URL target cannot be parsed
pub fn connect_options(config: &DatabaseSourceConfig) -> Result<PgConnectOptions> {
    let options = match &config.connection {
        DatabaseTarget::Url { url, .. } => PgConnectOptions::from_str(url.trim()).map_err(|e| {
            DiscoveryError::configuration(format!(
                "Invalid PostgreSQL connection string {}: {}",
                redact_database_url(url),
                e
            ))
        })?,
        DatabaseTarget::Host {
            host,
            user,
            password,
            database,
            ..
        } => {
            let mut options = PgConnectOptions::new()
                .host(host.trim())
                .port(config.effective_port());
            if let Some(user) = user.as_deref().filter(|u| !u.is_empty()) {
                options = options.username(user);
            }
            if let Some(password) = password.as_ref().filter(|p| !p.is_empty()) {
                options = options.password(password.expose());
            }
            if let Some(database) = database.as_deref().filter(|d| !d.is_empty()) {
                options = options.database(database);
            }
            options
        }
    };

    Ok(options.application_name("sourceprobe"))
}

fn query_failed(step: &str, error: sqlx::Error) -> DiscoveryError {
    DiscoveryError::connection_failed(format!("PostgreSQL {} failed: {}", step, error), error)
}

#[async_trait]
impl ColumnLister for PostgresLister {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(TABLE_EXISTS_QUERY)
            .bind(schema)
            .bind(table)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| query_failed("table lookup", e))?;
        Ok(count > 0)
    }

    async fn list_columns(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(LIST_COLUMNS_QUERY)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| query_failed("column listing", e))
    }

    async fn server_time(&mut self) -> Result<String> {
        let now: chrono::DateTime<chrono::Utc> = sqlx::query_scalar(LIVENESS_QUERY)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| query_failed("liveness query", e))?;
        Ok(now.to_rfc3339())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| query_failed("close", e))
    }
}
