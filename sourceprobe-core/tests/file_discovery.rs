//! File source discovery through the service facade.

use sourceprobe_core::{
    ConnectionConfig, DiscoveryService, DiscoverySettings, ErrorKind, FileSourceConfig,
};
use std::fs;
use tempfile::TempDir;

fn setup(files: &[(&str, &str)]) -> (TempDir, DiscoveryService) {
    let root = tempfile::tempdir().expect("Failed to create data root");
    fs::create_dir(root.path().join("accounts")).expect("Failed to create source directory");
    for (name, content) in files {
        fs::write(root.path().join("accounts").join(name), content).expect("Failed to write file");
    }
    let service = DiscoveryService::new(DiscoverySettings::new(root.path()))
        .expect("Failed to create service");
    (root, service)
}

fn accounts() -> ConnectionConfig {
    ConnectionConfig::File(FileSourceConfig::new("accounts"))
}

#[tokio::test]
async fn test_single_file_header_in_order() {
    let (_root, service) = setup(&[("export.csv", "id,\"name\", email\n1,Ada,ada@example.com\n")]);

    let result = service.discover(&accounts()).await;

    assert!(result.success);
    assert_eq!(result.columns, vec!["id", "name", "email"]);
    assert_eq!(result.status, 200);
    assert_eq!(
        result.sample,
        Some(serde_json::json!({"id": "1", "name": "Ada", "email": "ada@example.com"}))
    );
}

#[tokio::test]
async fn test_no_file_is_not_found() {
    let (_root, service) = setup(&[("readme.txt", "not a csv")]);

    let result = service.discover(&accounts()).await;

    assert!(!result.success);
    assert!(result.columns.is_empty());
    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_two_files_are_ambiguous() {
    let (_root, service) = setup(&[("a.csv", "x\n"), ("b.csv", "y\n")]);

    let result = service.discover(&accounts()).await;

    assert!(!result.success);
    assert!(result.columns.is_empty());
    assert_eq!(result.error_kind, Some(ErrorKind::AmbiguousSource));
    assert_eq!(result.status, 409);
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let (_root, service) = setup(&[("export.csv", "uid;mail\n")]);
    let config = ConnectionConfig::File(FileSourceConfig::new("accounts").with_delimiter(";"));

    let first = service.discover(&config).await;
    let second = service.discover(&config).await;

    assert_eq!(first, second);
    assert_eq!(first.columns, vec!["uid", "mail"]);
}

#[tokio::test]
async fn test_config_loaded_from_json() {
    let (_root, service) = setup(&[("export.csv", "a|b\n")]);
    let config: ConnectionConfig = serde_json::from_str(
        r#"{"kind": "FILE", "directory": "accounts", "delimiter": "|"}"#,
    )
    .expect("Failed to parse config");

    let result = service.discover(&config).await;
    assert_eq!(result.columns, vec!["a", "b"]);
}
