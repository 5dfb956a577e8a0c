//! faultline.toml 통합 설정 테스트
//!
//! - faultline.toml.example 파싱 테스트
//! - 파일 로딩 + 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use faultline_core::config::FaultlineConfig;
use faultline_core::error::{ConfigError, FaultlineError};
use serial_test::serial;

// =============================================================================
// faultline.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../faultline.toml.example");
    let config = FaultlineConfig::parse(content).expect("example config should parse");

    assert_eq!(config.channel.bind_addr, "127.0.0.1:31569");
    assert_eq!(config.injector.targets.len(), 2);
    assert_eq!(config.injector.targets[1].name, "follower");
    assert_eq!(config.campaign.violations_dir, "violations");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../faultline.toml.example");
    let config = FaultlineConfig::parse(content).expect("should parse");
    config.validate().expect("example config should be valid");
}

// =============================================================================
// 파일 로딩
// =============================================================================

#[tokio::test]
#[serial]
async fn load_applies_env_over_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("faultline.toml");
    std::fs::write(&path, "[trial]\nsettle_ms = 250\n").expect("write config");

    // SAFETY: serial 테스트이므로 다른 테스트와 환경변수를 공유하지 않습니다.
    unsafe { std::env::set_var("FAULTLINE_TRIAL_SETTLE_MS", "10") };
    let config = FaultlineConfig::load(&path).await;
    unsafe { std::env::remove_var("FAULTLINE_TRIAL_SETTLE_MS") };

    let config = config.expect("config should load");
    assert_eq!(config.trial.settle_ms, 10);
}

#[tokio::test]
#[serial]
async fn load_rejects_invalid_values_from_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("faultline.toml");
    std::fs::write(&path, "").expect("write config");

    // SAFETY: serial 테스트이므로 다른 테스트와 환경변수를 공유하지 않습니다.
    unsafe { std::env::set_var("FAULTLINE_GENERAL_LOG_FORMAT", "xml") };
    let result = FaultlineConfig::load(&path).await;
    unsafe { std::env::remove_var("FAULTLINE_GENERAL_LOG_FORMAT") };

    assert!(matches!(
        result,
        Err(FaultlineError::Config(ConfigError::InvalidValue { .. }))
    ));
}

#[tokio::test]
async fn malformed_file_is_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[trial\nsettle_ms = 1").expect("write config");

    let result = FaultlineConfig::from_file(&path).await;
    assert!(matches!(
        result,
        Err(FaultlineError::Config(ConfigError::ParseFailed { .. }))
    ));
}
