//! 트라이얼 결과 타입
//!
//! 한 트라이얼은 정확히 하나의 [`TrialResult`]를 만듭니다.
//! 결과는 결과 로그(JSON Lines)에 그대로 직렬화됩니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CheckpointId, FaultEvent};

/// 트라이얼 판정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrialOutcome {
    /// 불변식 유지
    Pass,
    /// 불변식 위반 (버그 후보)
    Violation { evidence: String },
    /// 판정 불가 (증거 부족, 시간 초과)
    Inconclusive { reason: String },
    /// 엔진 자체의 실패 (SUT에 대한 판정 아님)
    EngineError { reason: String },
}

impl TrialOutcome {
    /// 메트릭 / 요약용 고정 이름
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Violation { .. } => "violation",
            Self::Inconclusive { .. } => "inconclusive",
            Self::EngineError { .. } => "engine_error",
        }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Violation { .. })
    }

    pub fn is_engine_error(&self) -> bool {
        matches!(self, Self::EngineError { .. })
    }
}

impl fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Violation { evidence } => write!(f, "violation: {evidence}"),
            Self::Inconclusive { reason } => write!(f, "inconclusive: {reason}"),
            Self::EngineError { reason } => write!(f, "engine error: {reason}"),
        }
    }
}

/// 트라이얼 진단 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// 보고된 체크포인트 (보고 순서)
    pub checkpoints_seen: Vec<CheckpointId>,
    /// 주입된 이벤트
    pub events_fired: Vec<FaultEvent>,
    /// 드라이버 종료로 건너뛴 이벤트
    pub events_skipped: Vec<FaultEvent>,
    /// 드라이버 종료 코드
    pub driver_exit_code: Option<i32>,
    /// 드라이버가 시그널로 종료되었는지 여부
    pub driver_signaled: bool,
    /// 드라이버 출력 마지막 부분
    pub output_tail: Vec<String>,
    /// SUT가 보고한 상태 변수
    pub state: BTreeMap<String, String>,
    /// 힐링 후에도 남은 장애
    pub lingering_faults: Vec<String>,
    /// 러너가 마지막으로 거친 상태
    pub final_state: String,
}

/// 트라이얼 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// 트라이얼 ID
    pub trial_id: Uuid,
    /// 불변식 이름
    pub invariant: String,
    /// 실패 계획 ID (계획 로딩 실패 시 파일 경로)
    pub plan_id: String,
    /// 판정
    #[serde(flatten)]
    pub outcome: TrialOutcome,
    /// 진단 정보
    pub diagnostics: Diagnostics,
    /// 정리 스크립트 경고 (판정에는 영향 없음)
    pub cleanup_warning: Option<String>,
    /// 시작 시각 (Unix epoch 밀리초)
    pub started_at_ms: u64,
    /// 소요 시간 (밀리초)
    pub duration_ms: u64,
}

impl fmt::Display for TrialResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} on plan {}: {}",
            self.trial_id, self.invariant, self.plan_id, self.outcome
        )
    }
}
