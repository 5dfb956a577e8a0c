//! Integration tests for `faultline config` command.
//!
//! Tests config validation and display with real TOML files and the built binary.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn faultline() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_faultline"));
    command.env_remove("RUST_LOG");
    command
}

#[tokio::test]
async fn test_config_validate_valid_toml() {
    // Given: A valid config file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("faultline.toml");

    let valid_config = r#"
[general]
log_level = "info"
log_format = "json"

[channel]
bind_addr = "127.0.0.1:0"

[trial]
trials_per_invariant = 3
"#;

    fs::write(&config_path, valid_config).expect("should write config");

    // When: Loading the config
    let result = faultline_core::config::FaultlineConfig::load(&config_path).await;

    // Then: Should succeed with the file values
    let config = result.expect("valid config should load successfully");
    assert_eq!(config.trial.trials_per_invariant, 3);
    assert_eq!(config.channel.bind_addr, "127.0.0.1:0");
}

#[tokio::test]
async fn test_config_validate_malformed_toml() {
    // Given: A malformed TOML file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("bad.toml");

    fs::write(&config_path, "[general\nlog_level = \"info\"\n").expect("should write bad config");

    // When: Loading the config
    let result = faultline_core::config::FaultlineConfig::load(&config_path).await;

    // Then: Should fail
    assert!(result.is_err(), "malformed TOML should fail to load");
}

#[test]
fn test_config_validate_command_exit_codes() {
    // Given: One valid and one invalid config
    let temp_dir = TempDir::new().expect("should create temp dir");
    let good = temp_dir.path().join("good.toml");
    let bad = temp_dir.path().join("bad.toml");
    fs::write(&good, "[general]\nlog_level = \"warn\"\n").expect("write good");
    fs::write(&bad, "[general]\nlog_level = \"loud\"\n").expect("write bad");

    // When: Running `faultline config validate` on both
    let ok = faultline()
        .arg("--config")
        .arg(&good)
        .args(["config", "validate"])
        .output()
        .expect("should run faultline");
    let failed = faultline()
        .arg("--config")
        .arg(&bad)
        .args(["config", "validate", "--output", "json"])
        .output()
        .expect("should run faultline");

    // Then: Valid config exits 0, invalid exits 2 with the error in JSON
    assert!(ok.status.success(), "stderr: {}", String::from_utf8_lossy(&ok.stderr));
    assert_eq!(failed.status.code(), Some(2));
    let report: serde_json::Value =
        serde_json::from_slice(&failed.stdout).expect("stdout should be JSON");
    assert_eq!(report["valid"], false);
    assert!(
        report["errors"][0]
            .as_str()
            .unwrap_or_default()
            .contains("general.log_level")
    );
}

#[test]
fn test_config_show_section_without_file_shows_defaults() {
    // Given: No config file at the given path
    let temp_dir = TempDir::new().expect("should create temp dir");
    let missing = temp_dir.path().join("missing.toml");

    // When: Showing the trial section
    let output = faultline()
        .arg("--config")
        .arg(&missing)
        .args(["config", "show", "--section", "trial"])
        .output()
        .expect("should run faultline");

    // Then: Defaults are printed as TOML
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("trials_per_invariant = 1"), "{stdout}");
    assert!(stdout.contains("settle_ms = 3000"), "{stdout}");
}

#[test]
fn test_config_show_unknown_section_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let output = faultline()
        .arg("--config")
        .arg(temp_dir.path().join("missing.toml"))
        .args(["config", "show", "--section", "ebpf"])
        .output()
        .expect("should run faultline");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown section: ebpf"));
}
