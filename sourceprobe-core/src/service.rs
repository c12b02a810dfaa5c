//! Discovery facade routing a [`ConnectionConfig`] to its connector.

use crate::config::{
    ApiSourceConfig, ConnectionConfig, DatabaseSourceConfig, DiscoverySettings, FileSourceConfig,
};
use crate::connectors::{FileConnector, HttpConnector, RelationalConnector};
use crate::error::{DiscoveryError, Result};
use crate::models::{ApiDiscovery, ConnectionProbe, DiscoveryResult, FileHeader, TableColumns};

/// Entry point for all discovery calls.
///
/// Holds only immutable settings and a shared HTTP client, so one instance
/// can serve concurrent calls.
#[derive(Debug, Clone)]
pub struct DiscoveryService {
    settings: DiscoverySettings,
    files: FileConnector,
    relational: RelationalConnector,
    http: HttpConnector,
}

impl DiscoveryService {
    /// Creates a service from validated settings.
    ///
    /// # Errors
    /// Returns `Configuration` if the settings are invalid or the HTTP client
    /// cannot be built
    pub fn new(settings: DiscoverySettings) -> Result<Self> {
        settings.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(settings.timeouts.request)
            .user_agent(concat!("sourceprobe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                DiscoveryError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            files: FileConnector::new(settings.data_root.clone()),
            relational: RelationalConnector::new(settings.timeouts.connect),
            http: HttpConnector::new(client, settings.timeouts.request, settings.timeouts.token),
            settings,
        })
    }

    /// Settings this service was built with.
    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Discovers the fields of any configured source.
    ///
    /// Never fails: errors are logged and returned as a failed
    /// [`DiscoveryResult`] with empty columns.
    pub async fn discover(&self, config: &ConnectionConfig) -> DiscoveryResult {
        let kind = config.kind();
        let outcome = match config {
            ConnectionConfig::File(source) => self.discover_file(source).await.map(Into::into),
            ConnectionConfig::Database(source) => {
                self.discover_table(source).await.map(Into::into)
            }
            ConnectionConfig::Api(source) => self.discover_api(source).await.map(Into::into),
        };

        outcome.unwrap_or_else(|e| {
            tracing::error!("{} discovery failed: {}", kind, e);
            DiscoveryResult::failure(kind, &e)
        })
    }

    /// Reads the header of the single delimited file in a directory.
    ///
    /// # Errors
    /// See [`FileConnector::discover`]
    pub async fn discover_file(&self, source: &FileSourceConfig) -> Result<FileHeader> {
        self.files.discover(source).await
    }

    /// Lists the columns of a relational table.
    ///
    /// # Errors
    /// See [`RelationalConnector::discover`]
    pub async fn discover_table(&self, source: &DatabaseSourceConfig) -> Result<TableColumns> {
        self.relational.discover(source).await
    }

    /// Checks relational connectivity without a table.
    ///
    /// # Errors
    /// See [`RelationalConnector::probe`]
    pub async fn probe_database(&self, source: &DatabaseSourceConfig) -> Result<ConnectionProbe> {
        self.relational.probe(source).await
    }

    /// Calls an HTTP or SOAP endpoint and derives record fields.
    ///
    /// # Errors
    /// See [`HttpConnector::discover`]
    pub async fn discover_api(&self, source: &ApiSourceConfig) -> Result<ApiDiscovery> {
        self.http.discover(source).await
    }
}
