//! Delimited-file connector.
//!
//! A file source is a directory under the data root that must hold exactly
//! one `.csv` file. Only the header line (plus the next line, for a preview
//! sample) is ever read.

use crate::config::FileSourceConfig;
use crate::error::{DiscoveryError, Result};
use crate::models::FileHeader;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

/// Extension identifying delimited files.
pub const DELIMITED_FILE_EXTENSION: &str = "csv";

/// Longest header or sample line read, in bytes.
pub const MAX_LINE_BYTES: u64 = 1024 * 1024;

const UTF8_BOM: char = '\u{feff}';

/// Discovers the header of the single delimited file in a directory.
#[derive(Debug, Clone)]
pub struct FileConnector {
    root: PathBuf,
}

impl FileConnector {
    /// Creates a connector resolving directories under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reads the header of the only delimited file in the configured directory.
    ///
    /// # Errors
    /// - `Configuration` if the directory or the file escapes the root, or a
    ///   leading line exceeds [`MAX_LINE_BYTES`]
    /// - `NotFound` if the directory does not exist or holds no delimited file
    /// - `AmbiguousSource` if it holds more than one
    pub async fn discover(&self, config: &FileSourceConfig) -> Result<FileHeader> {
        config.validate()?;

        let root = self.canonical_root().await?;
        let directory = resolve_directory(&root, &config.directory).await?;
        let file = single_delimited_file(&root, &directory).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::debug!("Reading header of {}", file_name);

        let (header_line, sample_line) = read_leading_lines(&file).await?;
        let columns = header_line
            .as_deref()
            .map(|line| parse_delimited_line(line, &config.delimiter, &config.quote))
            .unwrap_or_default();

        let sample = sample_line
            .as_deref()
            .map(|line| parse_delimited_line(line, &config.delimiter, &config.quote))
            .filter(|values| !values.is_empty() && !columns.is_empty())
            .map(|values| {
                columns
                    .iter()
                    .zip(values)
                    .map(|(column, value)| (column.clone(), Value::String(value)))
                    .collect::<Map<String, Value>>()
            });

        tracing::info!(
            "Discovered {} columns in {}",
            columns.len(),
            file_name
        );

        Ok(FileHeader {
            file_name,
            columns,
            sample,
        })
    }

    async fn canonical_root(&self) -> Result<PathBuf> {
        tokio::fs::canonicalize(&self.root).await.map_err(|e| {
            DiscoveryError::configuration(format!(
                "data root '{}' is not accessible: {}",
                self.root.display(),
                e
            ))
        })
    }
}

/// Resolves `directory` under `root`, rejecting anything that escapes it.
async fn resolve_directory(root: &Path, directory: &str) -> Result<PathBuf> {
    let requested = Path::new(directory.trim());
    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Do not reveal whether an outside path exists
            if !lexically_within(root, &candidate) {
                return Err(escape_error(directory));
            }
            return Err(DiscoveryError::not_found(format!(
                "directory '{}'",
                directory
            )));
        }
        Err(e) => {
            return Err(DiscoveryError::io(
                format!("Failed to resolve directory '{}'", directory),
                e,
            ));
        }
    };

    if !resolved.starts_with(root) {
        tracing::warn!("Rejected directory outside the data root: {}", directory);
        return Err(escape_error(directory));
    }

    if !tokio::fs::metadata(&resolved)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Err(DiscoveryError::configuration(format!(
            "'{}' is not a directory",
            directory
        )));
    }

    Ok(resolved)
}

fn escape_error(directory: &str) -> DiscoveryError {
    DiscoveryError::configuration(format!(
        "directory '{}' is outside the data root",
        directory
    ))
}

/// Lexical containment check for paths that cannot be canonicalized.
fn lexically_within(root: &Path, candidate: &Path) -> bool {
    let mut depth: usize = 0;
    let relative = match candidate.strip_prefix(root) {
        Ok(relative) => relative,
        Err(_) => return false,
    };
    for component in relative.components() {
        match component {
            std::path::Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            std::path::Component::Normal(_) => depth += 1,
            _ => {}
        }
    }
    true
}

fn is_delimited_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DELIMITED_FILE_EXTENSION))
}

/// Returns the only delimited file in `directory`.
///
/// Symlinked files must resolve inside `root`.
async fn single_delimited_file(root: &Path, directory: &Path) -> Result<PathBuf> {
    let mut entries = tokio::fs::read_dir(directory).await.map_err(|e| {
        DiscoveryError::io(format!("Failed to list {}", directory.display()), e)
    })?;

    let mut matches = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        DiscoveryError::io(format!("Failed to list {}", directory.display()), e)
    })? {
        let path = entry.path();
        if !is_delimited_file(&path) {
            continue;
        }
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let resolved = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| DiscoveryError::io(format!("Failed to resolve {}", path.display()), e))?;
        if !resolved.starts_with(root) {
            tracing::warn!("Rejected file linking outside the data root: {}", path.display());
            return Err(DiscoveryError::configuration(format!(
                "file '{}' resolves outside the data root",
                entry.file_name().to_string_lossy()
            )));
        }
        matches.push(path);
    }

    match matches.len() {
        0 => Err(DiscoveryError::not_found(format!(
            "no file found in '{}'",
            directory
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ))),
        1 => Ok(matches.remove(0)),
        _ => {
            let mut files: Vec<String> = matches
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            files.sort();
            tracing::warn!("Directory holds {} delimited files", files.len());
            Err(DiscoveryError::AmbiguousSource { files })
        }
    }
}

/// Streams at most the first two lines of `path`.
async fn read_leading_lines(path: &Path) -> Result<(Option<String>, Option<String>)> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DiscoveryError::io(format!("Failed to open {}", path.display()), e))?;
    let mut reader = BufReader::new(file);

    let header = next_line(&mut reader, path)
        .await?
        .map(|line| line.trim_start_matches(UTF8_BOM).to_string());
    let sample = if header.is_some() {
        next_line(&mut reader, path).await?
    } else {
        None
    };

    Ok((header, sample))
}

/// Reads one line of at most [`MAX_LINE_BYTES`] plus its terminator.
async fn next_line(reader: &mut BufReader<tokio::fs::File>, path: &Path) -> Result<Option<String>> {
    let mut buffer = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES + 1)
        .read_until(b'\n', &mut buffer)
        .await
        .map_err(|e| DiscoveryError::io(format!("Failed to read {}", path.display()), e))?;
    if read == 0 {
        return Ok(None);
    }
    if read as u64 > MAX_LINE_BYTES && buffer.last() != Some(&b'\n') {
        return Err(DiscoveryError::configuration(format!(
            "line in '{}' exceeds {} bytes",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            MAX_LINE_BYTES
        )));
    }
    Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
}

/// Splits one line on `delimiter`, strips `quote` characters and trims each token.
///
/// A blank line yields no fields.
///
/// # Example
/// ```rust
/// use sourceprobe_core::connectors::file::parse_delimited_line;
///
/// let fields = parse_delimited_line("\"id\"; \"name\" ;email\r\n", ";", "\"");
/// assert_eq!(fields, vec!["id", "name", "email"]);
/// ```
pub fn parse_delimited_line(line: &str, delimiter: &str, quote: &str) -> Vec<String> {
    if line.trim().is_empty() {
        return Vec::new();
    }

    line.split(delimiter)
        .map(|token| {
            let unquoted: String = token.chars().filter(|c| !quote.contains(*c)).collect();
            unquoted.trim().to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn fixture() -> (TempDir, FileConnector) {
        let root = TempDir::new().unwrap();
        let connector = FileConnector::new(root.path());
        (root, connector)
    }

    #[test]
    fn test_parse_delimited_line() {
        assert_eq!(
            parse_delimited_line("id,name,email\n", ",", "\""),
            vec!["id", "name", "email"]
        );
        assert_eq!(
            parse_delimited_line("\"id\" | \"full name\"", "|", "\""),
            vec!["id", "full name"]
        );
        assert_eq!(
            parse_delimited_line("'a'\t'b'", "\t", "'"),
            vec!["a", "b"]
        );
        assert!(parse_delimited_line("  \r\n", ",", "\"").is_empty());
    }

    #[test]
    fn test_parse_keeps_empty_fields() {
        assert_eq!(parse_delimited_line("a,,b", ",", "\""), vec!["a", "", "b"]);
    }

    #[tokio::test]
    async fn test_single_file_header() {
        let (root, connector) = fixture();
        let accounts = root.path().join("accounts");
        std::fs::create_dir(&accounts).unwrap();
        write(&accounts, "accounts.csv", "id,name,email\n1,Ada,ada@example.com\n");

        let header = connector
            .discover(&FileSourceConfig::new("accounts"))
            .await
            .unwrap();

        assert_eq!(header.file_name, "accounts.csv");
        assert_eq!(header.columns, vec!["id", "name", "email"]);
        let sample = header.sample.unwrap();
        assert_eq!(sample["name"], "Ada");
        assert_eq!(sample["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_custom_delimiter_quote_and_bom() {
        let (root, connector) = fixture();
        let dir = root.path().join("hr");
        std::fs::create_dir(&dir).unwrap();
        write(&dir, "EXPORT.CSV", "\u{feff}'login' ; 'display name' ;'mail'\r\n");

        let config = FileSourceConfig::new("hr")
            .with_delimiter(";")
            .with_quote("'");
        let header = connector.discover(&config).await.unwrap();

        assert_eq!(header.columns, vec!["login", "display name", "mail"]);
        assert!(header.sample.is_none());
    }

    #[tokio::test]
    async fn test_other_extensions_ignored() {
        let (root, connector) = fixture();
        let dir = root.path().join("mixed");
        std::fs::create_dir(&dir).unwrap();
        write(&dir, "users.csv", "uid,mail\n");
        write(&dir, "README.txt", "not data\n");
        std::fs::create_dir(dir.join("archive.csv")).unwrap();

        let header = connector
            .discover(&FileSourceConfig::new("mixed"))
            .await
            .unwrap();
        assert_eq!(header.columns, vec!["uid", "mail"]);
    }

    #[tokio::test]
    async fn test_no_file_found() {
        let (root, connector) = fixture();
        std::fs::create_dir(root.path().join("empty")).unwrap();

        let error = connector
            .discover(&FileSourceConfig::new("empty"))
            .await
            .unwrap_err();

        assert!(matches!(error, DiscoveryError::NotFound { .. }));
        assert!(error.to_string().contains("no file found"));
    }

    #[tokio::test]
    async fn test_ambiguous_directory_names_both_files() {
        let (root, connector) = fixture();
        let dir = root.path().join("accounts");
        std::fs::create_dir(&dir).unwrap();
        write(&dir, "accounts.csv", "id,name,email\n");
        write(&dir, "accounts_old.csv", "id,name\n");

        let error = connector
            .discover(&FileSourceConfig::new("accounts"))
            .await
            .unwrap_err();

        match &error {
            DiscoveryError::AmbiguousSource { files } => {
                assert_eq!(files, &vec!["accounts.csv", "accounts_old.csv"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(error.to_string().contains("accounts_old.csv"));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let (_root, connector) = fixture();
        let error = connector
            .discover(&FileSourceConfig::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(error, DiscoveryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let secret = outer.path().join("secret");
        std::fs::create_dir(&secret).unwrap();
        write(&secret, "passwords.csv", "user,password\n");

        let connector = FileConnector::new(&root);

        let error = connector
            .discover(&FileSourceConfig::new("../secret"))
            .await
            .unwrap_err();
        assert!(matches!(error, DiscoveryError::Configuration { .. }));

        let absolute = secret.to_string_lossy().into_owned();
        let error = connector
            .discover(&FileSourceConfig::new(absolute))
            .await
            .unwrap_err();
        assert!(matches!(error, DiscoveryError::Configuration { .. }));

        let error = connector
            .discover(&FileSourceConfig::new("../missing"))
            .await
            .unwrap_err();
        assert!(matches!(error, DiscoveryError::Configuration { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_file_outside_root_rejected() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("root");
        let hr = root.join("hr");
        std::fs::create_dir_all(&hr).unwrap();
        write(outer.path(), "secret.txt", "user,password_hash\n");
        std::os::unix::fs::symlink(outer.path().join("secret.txt"), hr.join("x.csv")).unwrap();

        let error = FileConnector::new(&root)
            .discover(&FileSourceConfig::new("hr"))
            .await
            .unwrap_err();

        assert!(matches!(error, DiscoveryError::Configuration { .. }));
        assert!(!error.to_string().contains("password_hash"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_file_inside_root_accepted() {
        let (root, connector) = fixture();
        let shared = root.path().join("shared");
        let hr = root.path().join("hr");
        std::fs::create_dir(&shared).unwrap();
        std::fs::create_dir(&hr).unwrap();
        write(&shared, "people.txt", "id,name\n");
        std::os::unix::fs::symlink(shared.join("people.txt"), hr.join("people.csv")).unwrap();

        let header = connector
            .discover(&FileSourceConfig::new("hr"))
            .await
            .unwrap();
        assert_eq!(header.file_name, "people.csv");
        assert_eq!(header.columns, vec!["id", "name"]);
    }

    #[tokio::test]
    async fn test_oversized_header_line_rejected() {
        let (root, connector) = fixture();
        let dir = root.path().join("huge");
        std::fs::create_dir(&dir).unwrap();
        let line = "a".repeat(usize::try_from(MAX_LINE_BYTES).unwrap() + 16);
        write(&dir, "huge.csv", &line);

        let error = connector
            .discover(&FileSourceConfig::new("huge"))
            .await
            .unwrap_err();
        assert!(matches!(error, DiscoveryError::Configuration { .. }));
        assert!(error.to_string().contains("exceeds"));
    }

    #[tokio::test]
    async fn test_header_at_line_limit_accepted() {
        let (root, connector) = fixture();
        let dir = root.path().join("wide");
        std::fs::create_dir(&dir).unwrap();
        let line = "a".repeat(usize::try_from(MAX_LINE_BYTES).unwrap());
        write(&dir, "wide.csv", &format!("{line}\n1\n"));

        let header = connector
            .discover(&FileSourceConfig::new("wide"))
            .await
            .unwrap();
        assert_eq!(header.columns.len(), 1);
        assert!(header.sample.is_some());
    }

    #[tokio::test]
    async fn test_empty_file_has_no_columns() {
        let (root, connector) = fixture();
        let dir = root.path().join("blank");
        std::fs::create_dir(&dir).unwrap();
        write(&dir, "blank.csv", "");

        let header = connector
            .discover(&FileSourceConfig::new("blank"))
            .await
            .unwrap();
        assert!(header.columns.is_empty());
        assert!(header.sample.is_none());
    }

    #[tokio::test]
    async fn test_repeated_discovery_is_identical() {
        let (root, connector) = fixture();
        let dir = root.path().join("stable");
        std::fs::create_dir(&dir).unwrap();
        write(&dir, "stable.csv", "a,b,c\n");

        let config = FileSourceConfig::new("stable");
        let first = connector.discover(&config).await.unwrap();
        let second = connector.discover(&config).await.unwrap();
        assert_eq!(first, second);
    }
}
