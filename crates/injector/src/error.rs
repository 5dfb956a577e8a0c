//! 장애 주입기 에러 타입
//!
//! [`InjectorError`]는 주입기 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<InjectorError> for FaultlineError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use faultline_core::error::{ConfigError, FaultlineError, InjectionError};

/// 장애 주입기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum InjectorError {
    /// 등록되지 않은 대상
    #[error("fault target not found: {0}")]
    TargetNotFound(String),

    /// 대상이 장애에 반응하지 않음 (예: SIGKILL 후에도 살아 있음)
    #[error("target '{target}' unresponsive: {reason}")]
    TargetUnresponsive {
        /// 대상 이름
        target: String,
        /// 사유
        reason: String,
    },

    /// 액션 실행 실패
    #[error("{action} on '{target}' failed: {reason}")]
    ActionFailed {
        /// 대상 이름
        target: String,
        /// 액션 타입명
        action: String,
        /// 실패 사유
        reason: String,
    },

    /// 시그널을 보낼 프로세스가 이미 없음
    #[error("process {pid} no longer exists")]
    ProcessGone {
        /// 프로세스 ID
        pid: u32,
    },

    /// 파일 손상 / 복원 실패
    #[error("corrupt {path}: {reason}")]
    Corrupt {
        /// 대상 파일
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<InjectorError> for FaultlineError {
    fn from(err: InjectorError) -> Self {
        match err {
            InjectorError::TargetNotFound(name) => {
                FaultlineError::Injection(InjectionError::TargetNotFound(name))
            }
            InjectorError::TargetUnresponsive { target, reason } => {
                FaultlineError::Injection(InjectionError::TargetUnresponsive { target, reason })
            }
            InjectorError::ActionFailed {
                target,
                action,
                reason,
            } => FaultlineError::Injection(InjectionError::ActionFailed {
                target,
                action,
                reason,
            }),
            InjectorError::ProcessGone { pid } => {
                FaultlineError::Injection(InjectionError::TargetNotFound(format!("pid {pid}")))
            }
            InjectorError::Corrupt { path, reason } => {
                FaultlineError::Injection(InjectionError::ActionFailed {
                    target: path,
                    action: "corrupt".to_owned(),
                    reason,
                })
            }
            InjectorError::Config { field, reason } => {
                FaultlineError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
