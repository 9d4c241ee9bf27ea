use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn neurostack() -> Command {
    let mut cmd = Command::cargo_bin("neurostack").unwrap();
    cmd.env_remove("NEUROSTACK_CONFIG");
    cmd
}

fn session_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(
        b"timestamp,TP9,AF7,Right AUX\n\
          0.0,1.0,2.0,9.0\n\
          0.5,3.0,4.0,9.0\n\
          1.0,5.0,6.0,9.0\n\
          1.5,7.0,8.0,9.0\n",
    )
    .unwrap();
    file
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    neurostack()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    neurostack()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("neurostack"));
}

// =============================================================================
// INSPECT SUBCOMMAND
// =============================================================================

#[test]
fn test_inspect_window() {
    let file = session_file();
    let output = neurostack()
        .args(["inspect", "--compact", "--start", "0.75", "--num", "1", "--file"])
        .arg(file.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["eeg_channels"], serde_json::json!(["TP9", "AF7"]));
    assert_eq!(json["channels"].as_array().unwrap().len(), 3);
    assert_eq!(json["channels"][0]["num_samples"], 4);
    assert_eq!(json["data"]["TP9"][0]["timestamp"], 1.0);
    assert_eq!(json["data"]["AF7"].as_array().unwrap().len(), 1);
}

#[test]
fn test_inspect_unknown_channel_is_input_error() {
    let file = session_file();
    neurostack()
        .args(["inspect", "--channels", "O1", "--file"])
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown channel 'O1'"));
}

#[test]
fn test_inspect_missing_file() {
    neurostack()
        .args(["inspect", "--file", "/nonexistent/session.csv"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_inspect_malformed_file_is_source_error() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(b"timestamp,Cz\n0.0,1.0\n0.5,abc\n").unwrap();

    neurostack()
        .args(["inspect", "--file"])
        .arg(file.path())
        .assert()
        .code(3);
}

// =============================================================================
// STREAM SUBCOMMAND
// =============================================================================

#[test]
fn test_stream_synthetic_until_sample_limit() {
    neurostack()
        .args([
            "stream",
            "--synthetic",
            "--fast",
            "--quiet",
            "--compact",
            "--samples",
            "200",
            "--channels",
            "Cz",
            "Pz",
        ])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"frames_received\":200"))
        .stdout(predicate::str::contains("\"state\":\"stopped\""));
}

#[test]
fn test_stream_file_replay() {
    let file = session_file();
    neurostack()
        .args(["stream", "--fast", "--quiet", "--compact", "--file"])
        .arg(file.path())
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"samples_appended\":12"));
}

#[test]
fn test_stream_rejects_conflicting_sources() {
    neurostack()
        .args(["stream", "--synthetic", "--tcp", "localhost:5000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_stream_bad_tcp_address() {
    neurostack()
        .args(["stream", "--tcp", "nowhere", "--channels", "Cz"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("HOST:PORT"));
}

#[test]
fn test_stream_bad_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{\"report_interval_ms\": 0}").unwrap();

    neurostack()
        .args(["stream", "--config"])
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("report_interval_ms"));
}
