//! End-to-end tests of the `sourceprobe` binary.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use serde_json::Value;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn sourceprobe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sourceprobe"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run sourceprobe")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_list_prints_sources() {
    let output = sourceprobe(&["--quiet", "list"]);

    assert!(output.status.success());
    let listing = stdout_json(&output);
    assert_eq!(listing["sourceKinds"], serde_json::json!(["FILE", "DATABASE", "API"]));
    assert!(
        listing["databases"]
            .as_array()
            .unwrap()
            .iter()
            .any(|d| d["type"] == "postgres" && d["defaultPort"] == 5432)
    );
}

#[test]
fn test_file_command_reports_header() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("people")).unwrap();
    std::fs::write(
        root.path().join("people").join("export.csv"),
        "login;mail;manager\n",
    )
    .unwrap();

    let output = sourceprobe(&[
        "--quiet",
        "--data-root",
        root.path().to_str().unwrap(),
        "file",
        "people",
        "--delimiter",
        ";",
    ]);

    assert!(output.status.success());
    let response = stdout_json(&output);
    assert_eq!(response["header"], serde_json::json!(["login", "mail", "manager"]));
    assert_eq!(response["detectedColumnCount"], 3);
}

#[test]
fn test_file_command_failure_exit_code() {
    let root = tempfile::tempdir().unwrap();

    let output = sourceprobe(&[
        "--quiet",
        "--data-root",
        root.path().to_str().unwrap(),
        "file",
        "missing",
    ]);

    assert!(!output.status.success());
    let failure = stdout_json(&output);
    assert_eq!(failure["status"], 404);
}

#[test]
fn test_discover_reads_stdin() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("hr")).unwrap();
    std::fs::write(root.path().join("hr").join("staff.csv"), "id,name\n").unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_sourceprobe"))
        .args(["--quiet", "--data-root", root.path().to_str().unwrap(), "discover", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to spawn sourceprobe");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"kind": "FILE", "directory": "hr"}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let result = stdout_json(&output);
    assert_eq!(result["success"], true);
    assert_eq!(result["columns"], serde_json::json!(["id", "name"]));
}

#[test]
fn test_discover_rejects_invalid_definition() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.json");
    std::fs::write(&path, r#"{"kind": "CARRIER_PIGEON"}"#).unwrap();

    let output = sourceprobe(&["--quiet", "discover", path.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid source definition"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_api_command_against_mock_server() {
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"items":[{"uid":"u1","cn":"Ada"}]}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let uri = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        sourceprobe(&["--quiet", "api", &uri, "-H", "X-Tenant: acme", "--response-path", "items"])
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let response = stdout_json(&output);
    assert_eq!(response["detectedColumns"], serde_json::json!(["uid", "cn"]));
}
