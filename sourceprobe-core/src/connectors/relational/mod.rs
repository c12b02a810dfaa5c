//! Relational connector with one catalog strategy per SQL dialect.
//!
//! # Module Structure
//! - `postgres`: `information_schema` lister over a single `PgConnection`
//! - `oracle`: `all_tables` / `all_tab_columns` lister over ODPI-C
//!
//! # Guarantees
//! - Read-only catalog queries only
//! - One connection per call, closed on every path, no pooling
//! - Connect and catalog queries bounded by the connect timeout
//! - Connection strings are redacted in every message

#[cfg(feature = "oracle")]
pub mod oracle;
#[cfg(feature = "postgresql")]
pub mod postgres;

use crate::config::{DatabaseSourceConfig, Dialect};
use crate::error::{DiscoveryError, Result};
use crate::models::{ConnectionProbe, TableColumns};
use async_trait::async_trait;
use std::time::Duration;

/// Catalog access for one open connection of a given dialect.
///
/// Identifiers passed in are already normalized for the dialect.
#[async_trait]
pub trait ColumnLister: Send {
    /// Dialect served by this lister.
    fn dialect(&self) -> Dialect;

    /// True if `schema.table` exists in the catalog.
    async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool>;

    /// Column names of `schema.table` in catalog position order.
    async fn list_columns(&mut self, schema: &str, table: &str) -> Result<Vec<String>>;

    /// Runs the liveness query and returns the server clock.
    async fn server_time(&mut self) -> Result<String>;

    /// Closes the underlying connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens a lister for the configured dialect within `timeout`.
///
/// # Errors
/// - `Configuration` for dialects that are not queried or not compiled in
/// - `Connectivity` / `Timeout` when the server cannot be reached
pub async fn connect(
    config: &DatabaseSourceConfig,
    timeout: Duration,
) -> Result<Box<dyn ColumnLister>> {
    match config.dialect {
        #[cfg(feature = "postgresql")]
        Dialect::Postgres => {
            let lister = postgres::PostgresLister::connect(config, timeout).await?;
            Ok(Box::new(lister))
        }
        #[cfg(not(feature = "postgresql"))]
        Dialect::Postgres => Err(DiscoveryError::configuration(
            "PostgreSQL support not compiled in. Use --features postgresql",
        )),
        #[cfg(feature = "oracle")]
        Dialect::Oracle => {
            let lister = oracle::OracleLister::connect(config, timeout).await?;
            Ok(Box::new(lister))
        }
        #[cfg(not(feature = "oracle"))]
        Dialect::Oracle => Err(DiscoveryError::configuration(
            "Oracle support not compiled in. Use --features oracle",
        )),
        Dialect::Mysql | Dialect::Sqlserver => Err(DiscoveryError::configuration(format!(
            "{} sources are not supported for discovery",
            config.dialect
        ))),
    }
}

/// Discovers the columns of a configured relational table.
#[derive(Debug, Clone)]
pub struct RelationalConnector {
    connect_timeout: Duration,
}

impl RelationalConnector {
    /// Creates a connector bounding connect and catalog work by `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Verifies the table exists and lists its columns in catalog order.
    ///
    /// # Errors
    /// - `Configuration` if the table (or a resolvable schema) is missing
    /// - `Connectivity` / `Timeout` if the server cannot be reached
    /// - `NotFound` naming schema and table if the table does not exist
    pub async fn discover(&self, config: &DatabaseSourceConfig) -> Result<TableColumns> {
        config.validate()?;
        ensure_queryable(config.dialect)?;
        let table = config
            .effective_table()
            .ok_or_else(|| DiscoveryError::configuration("table name is required"))?;
        let schema = resolve_schema(config)?;

        tracing::info!(
            "Discovering columns of {}.{} on {} ({})",
            schema,
            table,
            config.connection,
            config.dialect
        );

        let mut lister = connect(config, self.connect_timeout).await?;
        let outcome = self
            .bounded(collect_table(lister.as_mut(), &schema, &table))
            .await;
        close_quietly(lister).await;
        let (columns, server_time) = outcome?;

        tracing::info!("Found {} columns in {}.{}", columns.len(), schema, table);

        Ok(TableColumns {
            dialect: config.dialect,
            schema,
            table,
            columns,
            server_time,
        })
    }

    /// Connects and runs the liveness query only.
    ///
    /// # Errors
    /// Returns `Connectivity` / `Timeout` if the server cannot be reached
    pub async fn probe(&self, config: &DatabaseSourceConfig) -> Result<ConnectionProbe> {
        config.validate()?;
        ensure_queryable(config.dialect)?;

        tracing::info!("Testing {} connection to {}", config.dialect, config.connection);

        let mut lister = connect(config, self.connect_timeout).await?;
        let outcome = self.bounded(lister.server_time()).await;
        close_quietly(lister).await;

        Ok(ConnectionProbe {
            dialect: config.dialect,
            server_time: outcome?,
        })
    }

    async fn bounded<T>(&self, work: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.connect_timeout, work)
            .await
            .map_err(|_| DiscoveryError::timeout("catalog queries", self.connect_timeout))?
    }
}

fn ensure_queryable(dialect: Dialect) -> Result<()> {
    if dialect.is_queryable() {
        Ok(())
    } else {
        Err(DiscoveryError::configuration(format!(
            "{} sources are not supported for discovery",
            dialect
        )))
    }
}

fn resolve_schema(config: &DatabaseSourceConfig) -> Result<String> {
    config.effective_schema().ok_or_else(|| {
        DiscoveryError::configuration(format!(
            "schema is required for {} sources without a user",
            config.dialect
        ))
    })
}

async fn collect_table(
    lister: &mut dyn ColumnLister,
    schema: &str,
    table: &str,
) -> Result<(Vec<String>, String)> {
    if !lister.table_exists(schema, table).await? {
        return Err(DiscoveryError::table_not_found(schema, table));
    }

    let columns = lister.list_columns(schema, table).await?;
    let server_time = lister.server_time().await?;
    Ok((columns, server_time))
}

async fn close_quietly(lister: Box<dyn ColumnLister>) {
    let dialect = lister.dialect();
    if let Err(e) = lister.close().await {
        tracing::warn!("Failed to close {} connection: {}", dialect, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseTarget;

    /// In-memory catalog standing in for a live connection.
    struct FakeLister {
        tables: Vec<(&'static str, &'static str, Vec<&'static str>)>,
        closed: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl ColumnLister for FakeLister {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool> {
            Ok(self
                .tables
                .iter()
                .any(|(s, t, _)| *s == schema && *t == table))
        }

        async fn list_columns(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
            Ok(self
                .tables
                .iter()
                .find(|(s, t, _)| *s == schema && *t == table)
                .map(|(_, _, c)| c.iter().map(|c| c.to_string()).collect())
                .unwrap_or_default())
        }

        async fn server_time(&mut self) -> Result<String> {
            Ok("2026-01-01T00:00:00+00:00".to_string())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.closed
                .store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn fake() -> FakeLister {
        FakeLister {
            tables: vec![("public", "users", vec!["id", "email", "status"])],
            closed: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_collect_table_in_catalog_order() {
        let mut lister = fake();
        let (columns, time) = collect_table(&mut lister, "public", "users").await.unwrap();
        assert_eq!(columns, vec!["id", "email", "status"]);
        assert!(time.starts_with("2026"));
    }

    #[tokio::test]
    async fn test_collect_table_missing_names_schema_and_table() {
        let mut lister = fake();
        let error = collect_table(&mut lister, "public", "groups")
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "\"public\".\"groups\" not found");
    }

    #[tokio::test]
    async fn test_close_quietly_closes() {
        let lister = fake();
        let closed = lister.closed.clone();
        close_quietly(Box::new(lister)).await;
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_discover_requires_table() {
        let connector = RelationalConnector::new(Duration::from_secs(5));
        let config = DatabaseSourceConfig::new(Dialect::Postgres, DatabaseTarget::host("db"));
        let error = connector.discover(&config).await.unwrap_err();
        assert!(matches!(error, DiscoveryError::Configuration { .. }));
        assert!(error.to_string().contains("table"));
    }

    #[tokio::test]
    async fn test_unsupported_dialects_rejected() {
        let connector = RelationalConnector::new(Duration::from_secs(5));
        for dialect in [Dialect::Mysql, Dialect::Sqlserver] {
            let config =
                DatabaseSourceConfig::new(dialect, DatabaseTarget::host("db")).with_table("users");
            let error = connector.discover(&config).await.unwrap_err();
            assert!(matches!(error, DiscoveryError::Configuration { .. }));
            assert!(error.to_string().contains("not supported"));
        }
    }

    #[tokio::test]
    async fn test_oracle_without_user_needs_schema() {
        let connector = RelationalConnector::new(Duration::from_secs(5));
        let config =
            DatabaseSourceConfig::new(Dialect::Oracle, DatabaseTarget::host("db")).with_table("t");
        let error = connector.discover(&config).await.unwrap_err();
        assert!(error.to_string().contains("schema is required"));
    }
}
