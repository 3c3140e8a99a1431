//! Integration tests for the `legovm` command line

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use legovm::vm::RxeBuilder;
use tempfile::TempDir;

/// Run the binary with an isolated config directory
fn legovm(
    dir: &TempDir,
    args: &[&str],
    file: &Path,
) -> Output {
    Command::new(env!("CARGO_BIN_EXE_legovm"))
        .args(args)
        .arg(file)
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("LEGOVM_MEMORY")
        .env_remove("LEGOVM_MAX_PASSES")
        .env_remove("LEGOVM_TIME_LIMIT_MS")
        .env_remove("LEGOVM_LOG")
        .output()
        .unwrap()
}

fn write_image(
    dir: &TempDir,
    name: &str,
    bytes: &[u8],
) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn sample_image() -> Vec<u8> {
    RxeBuilder::new()
        .static_size(8)
        .clump(0, &[1], 0)
        .clump(1, &[], 2)
        .code(&[0, 0, 0, 0])
        .build()
        .unwrap()
}

#[test]
fn test_inspect_json() {
    let dir = TempDir::new().unwrap();
    let file = write_image(&dir, "sample.rxe", &sample_image());

    let output = legovm(&dir, &["inspect", "--json"], &file);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["header"]["clump_count"], 2);
    assert_eq!(report["header"]["version"], 0x0500);
    assert_eq!(report["num_active_clumps"], 1);
    assert_eq!(report["clumps"].as_array().unwrap().len(), 2);
    assert_eq!(report["clumps"][1]["fire_count"], 1);
    assert_eq!(report["layout"]["dependencies"]["len"], 1);
}

#[test]
fn test_inspect_text() {
    let dir = TempDir::new().unwrap();
    let file = write_image(&dir, "sample.rxe", &sample_image());

    let output = legovm(&dir, &["inspect"], &file);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--- Header ---"));
    assert!(stdout.contains("Clumps: 2"));
    assert!(stdout.contains("1 active at load"));
}

#[test]
fn test_check_valid_image() {
    let dir = TempDir::new().unwrap();
    let file = write_image(&dir, "sample.rxe", &sample_image());

    let output = legovm(&dir, &["check"], &file);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Check passed: 2 clumps, 1 active"));
}

#[test]
fn test_check_rejects_bad_magic() {
    let dir = TempDir::new().unwrap();
    let mut bytes = sample_image();
    bytes[0] = b'X';
    let file = write_image(&dir, "bad.rxe", &bytes);

    let output = legovm(&dir, &["check"], &file);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid magic"));
}

#[test]
fn test_memory_flag_bounds_load() {
    let dir = TempDir::new().unwrap();
    let file = write_image(&dir, "sample.rxe", &sample_image());

    let output = legovm(&dir, &["--memory", "4", "check"], &file);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Out of memory"));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let output = legovm(&dir, &["check"], &dir.path().join("missing.rxe"));
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read image"));
}
