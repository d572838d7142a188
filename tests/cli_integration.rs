//! CLI integration tests: argument handling, exit codes and offline commands

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn oncotrack_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_oncotrack"))
}

const RESULTS_JSON: &str = r#"{
  "generated_at": "2024-08-01T12:00:00Z",
  "total_patients": 1,
  "patients": [{
    "patient_id": "P001",
    "timepoints": [
      {
        "date": "2024-01-15T00:00:00",
        "source_text": "Baseline CT",
        "observations": [{
          "lesion_id": "L1", "location": "right upper lobe", "size_cm": 2.3,
          "observed_at": "2024-01-15T00:00:00"
        }]
      },
      {
        "date": "2024-04-15T00:00:00",
        "source_text": "Follow-up CT",
        "observations": [{
          "lesion_id": "L1", "location": "right upper lobe", "size_cm": 2.8,
          "observed_at": "2024-04-15T00:00:00"
        }]
      }
    ],
    "summary": null
  }]
}"#;

#[test]
fn test_help_lists_subcommands() {
    let output = Command::new(oncotrack_bin())
        .arg("--help")
        .output()
        .expect("Failed to run oncotrack");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("track"));
    assert!(stdout.contains("timeline"));
    assert!(stdout.contains("health"));
}

#[test]
fn test_track_missing_input_exits_with_error() {
    let output = Command::new(oncotrack_bin())
        .args(["track", "/nonexistent/reports.csv"])
        .env_remove("ONCOTRACK_HOST")
        .output()
        .expect("Failed to run oncotrack");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_track_rejects_unknown_format() {
    let output = Command::new(oncotrack_bin())
        .args(["track", "reports.csv", "--format", "xml"])
        .output()
        .expect("Failed to run oncotrack");

    assert!(!output.status.success());
}

#[test]
fn test_timeline_reads_results_file() {
    let dir = TempDir::new().unwrap();
    let results = dir.path().join("results.json");
    fs::write(&results, RESULTS_JSON).unwrap();

    let output = Command::new(oncotrack_bin())
        .arg("timeline")
        .arg(&results)
        .args(["--patient", "P001", "--lesion", "L1"])
        .output()
        .expect("Failed to run oncotrack");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2024-01-15"));
    assert!(stdout.contains("2.3 cm"));
    assert!(stdout.contains("2.8 cm"));
}

#[test]
fn test_timeline_unknown_patient_fails() {
    let dir = TempDir::new().unwrap();
    let results = dir.path().join("results.json");
    fs::write(&results, RESULTS_JSON).unwrap();

    let output = Command::new(oncotrack_bin())
        .arg("timeline")
        .arg(&results)
        .args(["--patient", "P999"])
        .output()
        .expect("Failed to run oncotrack");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_health_unreachable_host_fails() {
    let output = Command::new(oncotrack_bin())
        .args(["health", "--host", "http://127.0.0.1:1", "--format", "json"])
        .output()
        .expect("Failed to run oncotrack");

    assert_eq!(output.status.code(), Some(1));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["reachable"], false);
}
