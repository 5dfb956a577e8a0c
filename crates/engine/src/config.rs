//! 엔진 설정
//!
//! [`EngineConfig`]는 core의 [`FaultlineConfig`]에서 엔진이 쓰는 부분을
//! `Duration`과 `Option<PathBuf>`로 바꿔 모은 것입니다.
//!
//! # 사용 예시
//! ```ignore
//! use faultline_core::config::FaultlineConfig;
//! use faultline_engine::config::EngineConfig;
//!
//! let core_config = FaultlineConfig::default();
//! let config = EngineConfig::from_core(&core_config)?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use faultline_core::config::FaultlineConfig;
use faultline_core::error::{ConfigError, FaultlineError};
use faultline_injector::FaultInjectorConfig;
use faultline_invariant::CheckerConfig;

/// 설정 상한값 상수
const MAX_CONNECTIONS: usize = 4096;
const MAX_LINE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_QUEUE_CAPACITY: usize = 65_536;
const MAX_TRIALS_PER_INVARIANT: u32 = 1000;
const MAX_OUTPUT_TAIL_LINES: usize = 100_000;

/// 계측 채널 설정
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// 리스너 바인드 주소 (`127.0.0.1:0`이면 임의 포트)
    pub bind_addr: String,
    /// 체크포인트 대기 상한
    pub checkpoint_timeout: Duration,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 한 줄의 최대 길이 (바이트)
    pub max_line_bytes: usize,
    /// 엔진으로 가는 메시지 큐 용량
    pub queue_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self::from_core(&faultline_core::config::ChannelConfig::default())
    }
}

impl ChannelSettings {
    pub fn from_core(core: &faultline_core::config::ChannelConfig) -> Self {
        Self {
            bind_addr: core.bind_addr.clone(),
            checkpoint_timeout: Duration::from_secs(core.checkpoint_timeout_secs),
            max_connections: core.max_connections,
            max_line_bytes: core.max_line_bytes,
            queue_capacity: core.queue_capacity,
        }
    }
}

/// 트라이얼 러너 설정
#[derive(Debug, Clone)]
pub struct TrialSettings {
    /// 트라이얼 전체 시간 상한
    pub trial_timeout: Duration,
    /// 드라이버 종료 후 늦은 보고를 기다리는 시간
    pub settle: Duration,
    /// 검사 전에 장애를 먼저 복구할지 여부
    pub heal_before_check: bool,
    /// 불변식마다 반복할 트라이얼 수
    pub trials_per_invariant: u32,
    /// 진단에 보관할 드라이버 출력 줄 수
    pub output_tail_lines: usize,
    /// 정리 스크립트 시간 상한
    pub cleanup_timeout: Duration,
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self::from_core(&faultline_core::config::TrialConfig::default())
    }
}

impl TrialSettings {
    pub fn from_core(core: &faultline_core::config::TrialConfig) -> Self {
        Self {
            trial_timeout: Duration::from_secs(core.trial_timeout_secs),
            settle: Duration::from_millis(core.settle_ms),
            heal_before_check: core.heal_before_check,
            trials_per_invariant: core.trials_per_invariant,
            output_tail_lines: core.output_tail_lines,
            cleanup_timeout: Duration::from_secs(core.cleanup_timeout_secs),
        }
    }
}

/// 캠페인 출력 경로 (없으면 해당 기능 끔)
#[derive(Debug, Clone, Default)]
pub struct CampaignPaths {
    pub stage_file: Option<PathBuf>,
    pub invariant_file: Option<PathBuf>,
    pub result_log: Option<PathBuf>,
    pub violations_dir: Option<PathBuf>,
}

impl CampaignPaths {
    pub fn from_core(core: &faultline_core::config::CampaignConfig) -> Self {
        let path = |s: &str| (!s.trim().is_empty()).then(|| PathBuf::from(s));
        Self {
            stage_file: path(&core.stage_file),
            invariant_file: path(&core.invariant_file),
            result_log: path(&core.result_log),
            violations_dir: path(&core.violations_dir),
        }
    }
}

/// 엔진 설정
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub channel: ChannelSettings,
    pub trial: TrialSettings,
    pub campaign: CampaignPaths,
    pub injector: FaultInjectorConfig,
    pub checker: CheckerConfig,
}

impl EngineConfig {
    /// core 설정에서 엔진 설정을 생성하고 검증합니다.
    pub fn from_core(core: &FaultlineConfig) -> Result<Self, FaultlineError> {
        let config = Self {
            channel: ChannelSettings::from_core(&core.channel),
            trial: TrialSettings::from_core(&core.trial),
            campaign: CampaignPaths::from_core(&core.campaign),
            injector: FaultInjectorConfig::from_core(&core.injector),
            checker: CheckerConfig::from_core(&core.invariant)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FaultlineError> {
        let channel = &self.channel;
        if channel.checkpoint_timeout.is_zero() {
            return Err(invalid("channel.checkpoint_timeout_secs", "must be greater than 0"));
        }
        if channel.max_connections == 0 || channel.max_connections > MAX_CONNECTIONS {
            return Err(invalid(
                "channel.max_connections",
                format!("must be 1-{MAX_CONNECTIONS}"),
            ));
        }
        if channel.max_line_bytes < 64 || channel.max_line_bytes > MAX_LINE_BYTES {
            return Err(invalid(
                "channel.max_line_bytes",
                format!("must be 64-{MAX_LINE_BYTES}"),
            ));
        }
        if channel.queue_capacity == 0 || channel.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid(
                "channel.queue_capacity",
                format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            ));
        }

        let trial = &self.trial;
        if trial.trial_timeout.is_zero() {
            return Err(invalid("trial.trial_timeout_secs", "must be greater than 0"));
        }
        if trial.cleanup_timeout.is_zero() {
            return Err(invalid("trial.cleanup_timeout_secs", "must be greater than 0"));
        }
        if trial.trials_per_invariant == 0 || trial.trials_per_invariant > MAX_TRIALS_PER_INVARIANT
        {
            return Err(invalid(
                "trial.trials_per_invariant",
                format!("must be 1-{MAX_TRIALS_PER_INVARIANT}"),
            ));
        }
        if trial.output_tail_lines == 0 || trial.output_tail_lines > MAX_OUTPUT_TAIL_LINES {
            return Err(invalid(
                "trial.output_tail_lines",
                format!("must be 1-{MAX_OUTPUT_TAIL_LINES}"),
            ));
        }

        self.injector.validate()?;
        self.checker.validate()?;
        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> FaultlineError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_core_config_converts() {
        let config = EngineConfig::from_core(&FaultlineConfig::default()).unwrap();
        assert_eq!(config.channel.bind_addr, "127.0.0.1:31569");
        assert_eq!(config.trial.settle, Duration::from_secs(3));
        assert_eq!(config.trial.trials_per_invariant, 1);
        assert!(config.campaign.result_log.is_none());
    }

    #[test]
    fn empty_campaign_paths_are_disabled() {
        let core = faultline_core::config::CampaignConfig {
            stage_file: "/tmp/stage.txt".to_owned(),
            result_log: "  ".to_owned(),
            ..Default::default()
        };
        let paths = CampaignPaths::from_core(&core);
        assert_eq!(paths.stage_file, Some(PathBuf::from("/tmp/stage.txt")));
        assert!(paths.result_log.is_none());
    }

    #[test]
    fn validate_rejects_tiny_line_cap() {
        let mut config = EngineConfig::default();
        config.channel.max_line_bytes = 8;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_line_bytes"));
    }

    #[test]
    fn validate_rejects_zero_trials_per_invariant() {
        let mut config = EngineConfig::default();
        config.trial.trials_per_invariant = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn injector_errors_surface_as_config_errors() {
        let mut config = EngineConfig::default();
        config.injector.kill_grace_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, FaultlineError::Config(_)));
    }
}
