use assert_cmd::Command;
use predicates::str::contains;
use serde_json::{Value, json};
use std::fs;
use tempfile::TempDir;

fn cli_cmd() -> Command {
    assert_cmd::cargo::cargo_bin_cmd!("crossgrant")
}

fn write_flow(tmp: &TempDir, flow: &Value) -> std::path::PathBuf {
    let path = tmp.path().join("flow.json");
    fs::write(&path, serde_json::to_vec(flow).unwrap()).unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Temporary cross-account S3 copy grants"))
        .stdout(contains("plan"))
        .stdout(contains("provision"))
        .stdout(contains("deprovision"));
}

#[test]
fn plan_prints_a_request() {
    let tmp = TempDir::new().unwrap();
    let flow = write_flow(
        &tmp,
        &json!({
            "id": "flow-1",
            "source": {
                "type": "AmazonS3",
                "region": "eu-central-1",
                "bucketName": "src",
                "objectName": "report.csv"
            },
            "destination": {
                "type": "AmazonS3",
                "region": "us-east-1",
                "bucketName": "dst",
                "folderName": "incoming",
                "keyName": "dst-credentials"
            }
        }),
    );

    let output = cli_cmd()
        .arg("plan")
        .arg("--flow")
        .arg(&flow)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let request: Value = serde_json::from_slice(&output).unwrap();

    assert_eq!(request["flowId"], json!("flow-1"));
    assert_eq!(request["source"]["bucketName"], json!("src"));
    assert_eq!(
        request["destination"]["objectName"],
        json!("incoming/report.csv")
    );
    assert!(!request["id"].as_str().unwrap().is_empty());
}

#[test]
fn plan_refuses_mismatched_endpoints() {
    let tmp = TempDir::new().unwrap();
    let flow = write_flow(
        &tmp,
        &json!({
            "id": "flow-2",
            "source": {"type": "AmazonS3", "region": "eu-central-1", "bucketName": "src",
                       "objectName": "a", "endpointOverride": "http://localhost:9000"},
            "destination": {"type": "AmazonS3", "region": "eu-central-1", "bucketName": "dst"}
        }),
    );

    cli_cmd()
        .arg("plan")
        .arg("--flow")
        .arg(&flow)
        .assert()
        .failure()
        .stderr(contains("flow-2"));
}

#[test]
fn missing_input_file_is_reported() {
    let tmp = TempDir::new().unwrap();
    cli_cmd()
        .arg("plan")
        .arg("--flow")
        .arg(tmp.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(contains("absent.json"));
}
