//! 장애 주입기 설정
//!
//! [`FaultInjectorConfig`]는 core의 [`InjectorConfig`](faultline_core::config::InjectorConfig)를
//! 기반으로 주입기 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use faultline_core::config::FaultlineConfig;
//! use faultline_injector::config::FaultInjectorConfig;
//!
//! let core_config = FaultlineConfig::default();
//! let config = FaultInjectorConfig::from_core(&core_config.injector);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InjectorError;
use crate::registry::TargetSpec;

/// 장애 주입기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultInjectorConfig {
    /// 액션 타임아웃 (초)
    pub action_timeout_secs: u64,
    /// 실패 시 재시도 최대 횟수
    pub retry_max_attempts: u32,
    /// 재시도 백오프 기본 간격 (밀리초)
    pub retry_backoff_base_ms: u64,
    /// SIGKILL 후 종료 확인 대기 시간 (밀리초)
    pub kill_grace_ms: u64,
    /// 네트워크 차단 명령 템플릿
    pub partition_command: String,
    /// 네트워크 복구 명령 템플릿
    pub heal_command: String,
    /// 정적 대상 목록
    pub targets: Vec<TargetSpec>,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 종료 확인 폴링 간격 (밀리초)
    pub kill_poll_interval_ms: u64,
}

impl Default for FaultInjectorConfig {
    fn default() -> Self {
        Self::from_core(&faultline_core::config::InjectorConfig::default())
    }
}

/// 설정 상한값 상수
const MAX_ACTION_TIMEOUT_SECS: u64 = 300;
const MAX_RETRY_ATTEMPTS: u32 = 10;
const MAX_RETRY_BACKOFF_BASE_MS: u64 = 30_000;
const MAX_KILL_GRACE_MS: u64 = 60_000;

impl FaultInjectorConfig {
    /// core의 `InjectorConfig`에서 주입기 설정을 생성합니다.
    pub fn from_core(core: &faultline_core::config::InjectorConfig) -> Self {
        Self {
            action_timeout_secs: core.action_timeout_secs,
            retry_max_attempts: core.retry_max_attempts,
            retry_backoff_base_ms: core.retry_backoff_base_ms,
            kill_grace_ms: core.kill_grace_ms,
            partition_command: core.partition_command.clone(),
            heal_command: core.heal_command.clone(),
            targets: core.targets.iter().map(TargetSpec::from_core).collect(),
            kill_poll_interval_ms: 50,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), InjectorError> {
        if self.action_timeout_secs == 0 || self.action_timeout_secs > MAX_ACTION_TIMEOUT_SECS {
            return Err(InjectorError::Config {
                field: "action_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_ACTION_TIMEOUT_SECS}"),
            });
        }

        if self.retry_max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(InjectorError::Config {
                field: "retry_max_attempts".to_owned(),
                reason: format!("must be 0-{MAX_RETRY_ATTEMPTS}"),
            });
        }

        if self.retry_backoff_base_ms > MAX_RETRY_BACKOFF_BASE_MS {
            return Err(InjectorError::Config {
                field: "retry_backoff_base_ms".to_owned(),
                reason: format!("must be 0-{MAX_RETRY_BACKOFF_BASE_MS}"),
            });
        }

        if self.kill_grace_ms == 0 || self.kill_grace_ms > MAX_KILL_GRACE_MS {
            return Err(InjectorError::Config {
                field: "kill_grace_ms".to_owned(),
                reason: format!("must be 1-{MAX_KILL_GRACE_MS}"),
            });
        }

        if self.kill_poll_interval_ms == 0 {
            return Err(InjectorError::Config {
                field: "kill_poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        for (field, template) in [
            ("partition_command", &self.partition_command),
            ("heal_command", &self.heal_command),
        ] {
            if template.trim().is_empty() {
                return Err(InjectorError::Config {
                    field: field.to_owned(),
                    reason: "must not be empty".to_owned(),
                });
            }
        }

        Ok(())
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn kill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.kill_poll_interval_ms)
    }
}

/// 장애 주입기 설정 빌더
#[derive(Default)]
pub struct FaultInjectorConfigBuilder {
    config: FaultInjectorConfig,
}

impl FaultInjectorConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 액션 타임아웃(초)을 설정합니다.
    pub fn action_timeout_secs(mut self, secs: u64) -> Self {
        self.config.action_timeout_secs = secs;
        self
    }

    /// 재시도 최대 횟수를 설정합니다.
    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_max_attempts = attempts;
        self
    }

    /// 재시도 백오프 기본 간격(밀리초)을 설정합니다.
    pub fn retry_backoff_base_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_base_ms = ms;
        self
    }

    /// SIGKILL 후 종료 확인 대기 시간(밀리초)을 설정합니다.
    pub fn kill_grace_ms(mut self, ms: u64) -> Self {
        self.config.kill_grace_ms = ms;
        self
    }

    /// 종료 확인 폴링 간격(밀리초)을 설정합니다.
    pub fn kill_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.kill_poll_interval_ms = ms;
        self
    }

    /// 대상을 추가합니다.
    pub fn target(mut self, target: TargetSpec) -> Self {
        self.config.targets.push(target);
        self
    }

    /// 설정을 검증하고 `FaultInjectorConfig`를 생성합니다.
    pub fn build(self) -> Result<FaultInjectorConfig, InjectorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
