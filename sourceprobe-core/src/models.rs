//! Discovery outcomes.
//!
//! Each connector returns its own outcome type carrying the details its
//! boundary operation reports. [`DiscoveryResult`] is the uniform shape the
//! facade produces from any of them, or from a [`DiscoveryError`].

use crate::config::{Dialect, SourceKind};
use crate::error::{DiscoveryError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Uniform result of one discovery call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    /// Source kind that was probed
    pub kind: SourceKind,
    /// True when the source was reached and (possibly empty) fields listed
    pub success: bool,
    /// Field names in source-native order; empty on failure
    pub columns: Vec<String>,
    /// Human-readable outcome
    pub message: String,
    /// First parsed record, for preview
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Value>,
    /// HTTP-style status classification
    pub status: u16,
    /// Error classification on failure or soft success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl DiscoveryResult {
    /// Builds a failure result from an error.
    pub fn failure(kind: SourceKind, error: &DiscoveryError) -> Self {
        Self {
            kind,
            success: false,
            columns: Vec::new(),
            message: error.to_string(),
            sample: None,
            status: error.status_code(),
            error_kind: Some(error.kind()),
        }
    }

    /// True when the call succeeded but no field can be mapped.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Header extracted from the single delimited file of a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Name of the file the header was read from
    pub file_name: String,
    /// Header fields in file order
    pub columns: Vec<String>,
    /// Second line zipped with the header, when present
    pub sample: Option<Map<String, Value>>,
}

impl From<FileHeader> for DiscoveryResult {
    fn from(header: FileHeader) -> Self {
        Self {
            kind: SourceKind::File,
            success: true,
            message: format!(
                "Read {} columns from {}",
                header.columns.len(),
                header.file_name
            ),
            columns: header.columns,
            sample: header.sample.map(Value::Object),
            status: 200,
            error_kind: None,
        }
    }
}

/// Result of a connectivity-only relational probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProbe {
    /// Dialect that answered
    pub dialect: Dialect,
    /// Server clock as reported by the liveness query
    pub server_time: String,
}

/// Columns of one relational table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumns {
    /// Dialect that answered
    pub dialect: Dialect,
    /// Normalized schema name
    pub schema: String,
    /// Normalized table name
    pub table: String,
    /// Column names in catalog position order
    pub columns: Vec<String>,
    /// Server clock as reported by the liveness query
    pub server_time: String,
}

impl From<TableColumns> for DiscoveryResult {
    fn from(table: TableColumns) -> Self {
        Self {
            kind: SourceKind::Database,
            success: true,
            message: format!(
                "Connected to {} and found {} columns in \"{}\".\"{}\"",
                table.dialect,
                table.columns.len(),
                table.schema,
                table.table
            ),
            columns: table.columns,
            sample: None,
            status: 200,
            error_kind: None,
        }
    }
}

/// Outcome of one HTTP/SOAP discovery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDiscovery {
    /// Upstream HTTP status
    pub status_code: u16,
    /// False when the body could not be parsed (soft success)
    pub parsed: bool,
    /// Keys of the first record
    pub columns: Vec<String>,
    /// First record of the located list
    pub preview: Option<Value>,
    /// Parsed response tree, or a truncated raw body when unparsed
    pub full_response: Value,
    /// Path segments that actually resolved
    pub resolved_path: Vec<String>,
    /// Human-readable outcome
    pub message: String,
}

impl From<ApiDiscovery> for DiscoveryResult {
    fn from(api: ApiDiscovery) -> Self {
        Self {
            kind: SourceKind::Api,
            success: true,
            columns: api.columns,
            message: api.message,
            sample: if api.parsed {
                api.preview
            } else {
                Some(api.full_response)
            },
            status: 200,
            error_kind: if api.parsed {
                None
            } else {
                Some(ErrorKind::Parse)
            },
        }
    }
}
