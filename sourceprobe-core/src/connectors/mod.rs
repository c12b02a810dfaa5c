//! Source connectors.
//!
//! # Module Structure
//! - `file`: single delimited file per directory, header as columns
//! - `relational`: catalog lookups per SQL dialect
//! - `http`: one REST/SOAP call, optional OAuth2 token exchange first
//!
//! Connectors are stateless apart from their settings; every call opens
//! and releases its own resources.

pub mod file;
pub mod http;
pub mod relational;

pub use file::FileConnector;
pub use http::{HttpConnector, TokenExchanger};
pub use relational::{ColumnLister, RelationalConnector};
