//! 설정 관리 -- faultline.toml 파싱 및 런타임 설정
//!
//! [`FaultlineConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`FAULTLINE_CHANNEL_BIND_ADDR=127.0.0.1:4000` 형식)
//! 3. 설정 파일 (`faultline.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), faultline_core::error::FaultlineError> {
//! use faultline_core::config::FaultlineConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FaultlineConfig::load("faultline.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FaultlineConfig::parse("[trial]\nsettle_ms = 500")?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FaultlineError};

/// Faultline 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultlineConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 계측 채널 설정
    #[serde(default)]
    pub channel: ChannelConfig,
    /// 트라이얼 러너 설정
    #[serde(default)]
    pub trial: TrialConfig,
    /// 장애 주입기 설정
    #[serde(default)]
    pub injector: InjectorConfig,
    /// 불변식 검사기 설정
    #[serde(default)]
    pub invariant: InvariantConfig,
    /// 캠페인 설정
    #[serde(default)]
    pub campaign: CampaignConfig,
}

impl FaultlineConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FaultlineError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값에 환경변수만 적용합니다.
    ///
    /// CLI가 설정 파일 없이도 동작하도록 할 때 사용합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, FaultlineError> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Self::load(path).await;
        }
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FaultlineError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FaultlineError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FaultlineError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FaultlineError> {
        toml::from_str(toml_str).map_err(|e| {
            FaultlineError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `FAULTLINE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "FAULTLINE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FAULTLINE_GENERAL_LOG_FORMAT");

        // Channel
        override_string(&mut self.channel.bind_addr, "FAULTLINE_CHANNEL_BIND_ADDR");
        override_u64(
            &mut self.channel.checkpoint_timeout_secs,
            "FAULTLINE_CHANNEL_CHECKPOINT_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.channel.max_connections,
            "FAULTLINE_CHANNEL_MAX_CONNECTIONS",
        );

        // Trial
        override_u64(
            &mut self.trial.trial_timeout_secs,
            "FAULTLINE_TRIAL_TRIAL_TIMEOUT_SECS",
        );
        override_u64(&mut self.trial.settle_ms, "FAULTLINE_TRIAL_SETTLE_MS");
        override_bool(
            &mut self.trial.heal_before_check,
            "FAULTLINE_TRIAL_HEAL_BEFORE_CHECK",
        );
        override_u32(
            &mut self.trial.trials_per_invariant,
            "FAULTLINE_TRIAL_TRIALS_PER_INVARIANT",
        );

        // Injector
        override_u64(
            &mut self.injector.action_timeout_secs,
            "FAULTLINE_INJECTOR_ACTION_TIMEOUT_SECS",
        );
        override_u32(
            &mut self.injector.retry_max_attempts,
            "FAULTLINE_INJECTOR_RETRY_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.injector.kill_grace_ms,
            "FAULTLINE_INJECTOR_KILL_GRACE_MS",
        );

        // Invariant
        override_string(
            &mut self.invariant.default_strategy,
            "FAULTLINE_INVARIANT_DEFAULT_STRATEGY",
        );
        override_string(
            &mut self.invariant.failure_marker,
            "FAULTLINE_INVARIANT_FAILURE_MARKER",
        );

        // Campaign
        override_string(&mut self.campaign.stage_file, "FAULTLINE_CAMPAIGN_STAGE_FILE");
        override_string(
            &mut self.campaign.invariant_file,
            "FAULTLINE_CAMPAIGN_INVARIANT_FILE",
        );
        override_string(&mut self.campaign.result_log, "FAULTLINE_CAMPAIGN_RESULT_LOG");
        override_string(
            &mut self.campaign.violations_dir,
            "FAULTLINE_CAMPAIGN_VIOLATIONS_DIR",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FaultlineError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.channel.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(invalid(
                "channel.bind_addr",
                format!("'{}' is not a socket address", self.channel.bind_addr),
            ));
        }
        if self.channel.checkpoint_timeout_secs == 0 {
            return Err(invalid(
                "channel.checkpoint_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.trial.trial_timeout_secs == 0 {
            return Err(invalid(
                "trial.trial_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.trial.trials_per_invariant == 0 {
            return Err(invalid(
                "trial.trials_per_invariant",
                "must be at least 1".to_owned(),
            ));
        }

        let mut names = HashSet::new();
        for target in &self.injector.targets {
            if target.name.is_empty() {
                return Err(invalid(
                    "injector.targets.name",
                    "target name must not be empty".to_owned(),
                ));
            }
            if !names.insert(target.name.as_str()) {
                return Err(invalid(
                    "injector.targets.name",
                    format!("duplicate target '{}'", target.name),
                ));
            }
        }

        let valid_defaults = ["output-marker", "exit-status"];
        if !valid_defaults.contains(&self.invariant.default_strategy.as_str()) {
            return Err(invalid(
                "invariant.default_strategy",
                format!("must be one of: {}", valid_defaults.join(", ")),
            ));
        }
        if self.invariant.failure_marker.is_empty() {
            return Err(invalid(
                "invariant.failure_marker",
                "must not be empty".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> FaultlineError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 계측 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// 리스너 바인드 주소
    pub bind_addr: String,
    /// 체크포인트 대기 상한 (초)
    pub checkpoint_timeout_secs: u64,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 한 줄의 최대 길이 (바이트)
    pub max_line_bytes: usize,
    /// 엔진으로 가는 메시지 큐 용량
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:31569".to_owned(),
            checkpoint_timeout_secs: 60,
            max_connections: 64,
            max_line_bytes: 8 * 1024,
            queue_capacity: 64,
        }
    }
}

/// 트라이얼 러너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// 트라이얼 전체 시간 상한 (초)
    pub trial_timeout_secs: u64,
    /// 드라이버 종료 후 늦은 보고를 기다리는 시간 (밀리초)
    pub settle_ms: u64,
    /// 검사 전에 되돌릴 수 있는 장애를 먼저 복구할지 여부
    pub heal_before_check: bool,
    /// 불변식마다 반복할 트라이얼 수
    pub trials_per_invariant: u32,
    /// 진단에 보관할 드라이버 출력 줄 수
    pub output_tail_lines: usize,
    /// 정리 스크립트 시간 상한 (초)
    pub cleanup_timeout_secs: u64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            trial_timeout_secs: 600,
            settle_ms: 3000,
            heal_before_check: true,
            trials_per_invariant: 1,
            output_tail_lines: 200,
            cleanup_timeout_secs: 300,
        }
    }
}

/// 장애 주입기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorConfig {
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
    pub targets: Vec<TargetConfig>,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            action_timeout_secs: 10,
            retry_max_attempts: 2,
            retry_backoff_base_ms: 100,
            kill_grace_ms: 5000,
            partition_command:
                "iptables -I INPUT -s {peer_host} -d {target_host} -p tcp --dport {target_port} -j DROP"
                    .to_owned(),
            heal_command:
                "iptables -D INPUT -s {peer_host} -d {target_host} -p tcp --dport {target_port} -j DROP"
                    .to_owned(),
            targets: Vec::new(),
        }
    }
}

/// 장애 대상 (노드/프로세스)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// 계획에서 쓰이는 대상 이름
    pub name: String,
    /// 고정 PID
    pub pid: Option<u32>,
    /// PID 파일 경로
    pub pid_file: Option<String>,
    /// 대상 주소 (host:port), 네트워크 차단에 사용
    pub address: Option<String>,
    /// 데이터 디렉토리, 상대 경로 손상 대상의 기준
    pub data_dir: Option<String>,
}

/// 불변식 검사기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvariantConfig {
    /// 이름만 있는 불변식의 기본 전략 (output-marker, exit-status)
    pub default_strategy: String,
    /// 드라이버 출력의 실패 마커
    pub failure_marker: String,
    /// 프로브 명령 시간 상한 (초)
    pub probe_timeout_secs: u64,
    /// 불변식 이름 → 프로브 명령
    pub probes: BTreeMap<String, String>,
}

impl Default for InvariantConfig {
    fn default() -> Self {
        Self {
            default_strategy: "output-marker".to_owned(),
            failure_marker: "test has failed".to_owned(),
            probe_timeout_secs: 30,
            probes: BTreeMap::new(),
        }
    }
}

/// 캠페인 설정
///
/// 빈 문자열은 해당 기능을 끕니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// 단계 신호 파일
    pub stage_file: String,
    /// 현재 불변식 파일
    pub invariant_file: String,
    /// 결과 로그 (JSON Lines)
    pub result_log: String,
    /// 위반 재현 계획을 기록할 디렉토리
    pub violations_dir: String,
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
