//! 에러 타입 -- 도메인별 에러 정의
//!
//! [`FaultlineError`]는 모든 크레이트가 최종적으로 수렴하는 최상위 에러입니다.
//! 각 도메인 크레이트는 자체 에러 타입을 두고 `From` 변환으로 여기에 합류합니다.

/// Faultline 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FaultlineError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 실패 계획 / 불변식 목록 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] PlanError),

    /// 계측 채널 에러
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// 장애 주입 에러
    #[error("injection error: {0}")]
    Injection(#[from] InjectionError),

    /// 불변식 해석 에러
    #[error("invariant error: {0}")]
    Invariant(#[from] InvariantError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 실패 계획 파싱 에러
///
/// 줄 번호는 1부터 시작합니다.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// 계획 파일 읽기 실패
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 파일 크기 초과
    #[error("plan too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// 헤더 줄 누락
    #[error("missing plan header (expected 'faultline-plan <id>')")]
    MissingHeader,

    /// 불변식 참조 줄 누락
    #[error("missing invariant reference after plan header")]
    MissingInvariant,

    /// 장애 이벤트가 하나도 없음
    #[error("plan declares no fault events")]
    NoEvents,

    /// 알 수 없는 장애 액션
    #[error("line {line}: unknown fault action '{action}'")]
    UnknownAction { line: usize, action: String },

    /// 형식이 잘못된 이벤트 줄
    #[error("line {line}: {reason}")]
    InvalidEvent { line: usize, reason: String },

    /// 같은 (체크포인트, 대상) 쌍이 두 번 선언됨
    #[error("line {line}: duplicate event for checkpoint '{checkpoint}' and target '{target}'")]
    DuplicateCheckpointTarget {
        line: usize,
        checkpoint: String,
        target: String,
    },

    /// 숫자 체크포인트가 감소함
    #[error("line {line}: checkpoint ids must be non-decreasing")]
    OutOfOrder { line: usize },

    /// 알 수 없는 불변식 전략
    #[error("unknown invariant strategy '{0}'")]
    UnknownStrategy(String),

    /// 형식이 잘못된 불변식 참조
    #[error("invalid invariant reference '{reference}': {reason}")]
    InvalidInvariant { reference: String, reason: String },

    /// 불변식 목록이 비어 있음
    #[error("invariant list {path} is empty")]
    NoInvariants { path: String },
}

/// 계측 채널 에러
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// 체크포인트 대기 시간 초과
    #[error("no checkpoint reported within {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// 리스너 바인드 실패
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// 채널이 닫힘
    #[error("channel closed: {0}")]
    Closed(String),

    /// 프로토콜 위반
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// 장애 주입 에러 (도메인 크레이트에서 변환되는 요약 형태)
#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    /// 대상 프로세스를 찾을 수 없음
    #[error("fault target not found: {0}")]
    TargetNotFound(String),

    /// 대상이 장애에 반응하지 않음
    #[error("target '{target}' unresponsive: {reason}")]
    TargetUnresponsive { target: String, reason: String },

    /// 장애 액션 실패
    #[error("{action} on '{target}' failed: {reason}")]
    ActionFailed {
        target: String,
        action: String,
        reason: String,
    },
}

/// 불변식 해석 에러
///
/// 검사 자체를 수행할 수 없는 경우로, SUT에 대한 판정이 아닙니다.
#[derive(Debug, thiserror::Error)]
pub enum InvariantError {
    /// 전략 인자가 올바르지 않음
    #[error("invariant '{invariant}': {reason}")]
    InvalidArgument { invariant: String, reason: String },

    /// 이름만 있는 불변식을 해석할 수 없음
    #[error("cannot resolve invariant '{0}'")]
    Unresolved(String),
}
