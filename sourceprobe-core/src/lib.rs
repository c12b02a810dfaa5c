//! Connectivity checks and field discovery for identity data sources.
//!
//! Given an administrator-supplied [`ConnectionConfig`], this crate reaches
//! the source once and returns the ordered list of field names it exposes,
//! which a mapping screen offers as import attributes.
//!
//! # Sources
//! - Delimited files: the single `.csv` file of a directory under the data root
//! - Relational tables: PostgreSQL and Oracle catalogs
//! - HTTP (REST) and SOAP endpoints, with optional OAuth2 client credentials
//!
//! # Guarantees
//! - Read-only: files are only read, SQL is catalog queries only
//! - Every blocking point is bounded by a configurable timeout
//! - No credentials appear in results, errors or logs
//! - No state is kept between calls

pub mod config;
pub mod connectors;
pub mod error;
pub mod logging;
pub mod models;
pub mod operations;
pub mod service;

// Re-export commonly used types
pub use config::{
    ApiSourceConfig, ApiSubtype, AuthDescriptor, ConnectionConfig, DatabaseSourceConfig,
    DatabaseTarget, Dialect, DiscoverySettings, FileSourceConfig, HttpMethod, Secret, SourceKind,
    Timeouts, TokenRequest,
};
pub use error::{DiscoveryError, ErrorKind, Result};
pub use models::{ApiDiscovery, ConnectionProbe, DiscoveryResult, FileHeader, TableColumns};
pub use operations::{OperationFailure, OperationResult};
pub use service::DiscoveryService;
