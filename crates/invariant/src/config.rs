//! 불변식 검사기 설정
//!
//! [`CheckerConfig`]는 core의 [`InvariantConfig`](faultline_core::config::InvariantConfig)를
//! 검사기가 바로 쓸 수 있는 형태(토큰, `Duration`)로 바꾼 것입니다.

use std::collections::BTreeMap;
use std::time::Duration;

use faultline_core::error::{ConfigError, FaultlineError};
use faultline_core::invariant::StrategyToken;

/// 프로브 시간 상한의 최대값 (초)
const MAX_PROBE_TIMEOUT_SECS: u64 = 3600;

/// 불변식 검사기 설정
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// 이름만 있는 불변식의 기본 전략
    pub default_strategy: StrategyToken,
    /// 드라이버 출력의 실패 마커
    pub failure_marker: String,
    /// 프로브 명령 시간 상한
    pub probe_timeout: Duration,
    /// 불변식 이름 → 프로브 명령
    pub probes: BTreeMap<String, String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            default_strategy: StrategyToken::OutputMarker,
            failure_marker: "test has failed".to_owned(),
            probe_timeout: Duration::from_secs(30),
            probes: BTreeMap::new(),
        }
    }
}

impl CheckerConfig {
    /// core 설정에서 검사기 설정을 생성합니다.
    ///
    /// # Errors
    /// 기본 전략이 `output-marker`나 `exit-status`가 아니거나,
    /// 마커가 비어 있거나, 프로브 시간 상한이 범위를 벗어나면 에러를 반환합니다.
    pub fn from_core(
        core: &faultline_core::config::InvariantConfig,
    ) -> Result<Self, FaultlineError> {
        let default_strategy = core
            .default_strategy
            .parse::<StrategyToken>()
            .map_err(|e| invalid("invariant.default_strategy", e.to_string()))?;

        let config = Self {
            default_strategy,
            failure_marker: core.failure_marker.clone(),
            probe_timeout: Duration::from_secs(core.probe_timeout_secs),
            probes: core.probes.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FaultlineError> {
        if !matches!(
            self.default_strategy,
            StrategyToken::OutputMarker | StrategyToken::ExitStatus
        ) {
            return Err(invalid(
                "invariant.default_strategy",
                format!(
                    "'{}' needs an argument; use output-marker or exit-status",
                    self.default_strategy
                ),
            ));
        }

        if self.failure_marker.trim().is_empty() {
            return Err(invalid("invariant.failure_marker", "must not be empty"));
        }

        let secs = self.probe_timeout.as_secs();
        if secs == 0 || secs > MAX_PROBE_TIMEOUT_SECS {
            return Err(invalid(
                "invariant.probe_timeout_secs",
                format!("must be 1-{MAX_PROBE_TIMEOUT_SECS}"),
            ));
        }

        if let Some((name, _)) = self.probes.iter().find(|(_, cmd)| cmd.trim().is_empty()) {
            return Err(invalid(
                "invariant.probes",
                format!("probe '{name}' has an empty command"),
            ));
        }

        Ok(())
    }

    /// 프로브를 추가합니다.
    pub fn with_probe(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.probes.insert(name.into(), command.into());
        self
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> FaultlineError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}
