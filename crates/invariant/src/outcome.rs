//! 검사 판정

use std::fmt;

use faultline_core::result::TrialOutcome;

/// 불변식 검사 판정
///
/// 엔진 실패는 여기에 없습니다. 검사기가 판정하지 못하는 경우는
/// 인자 오류(`InvariantError`)이거나 `Inconclusive`입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// 불변식 유지
    Pass,
    /// 불변식 위반
    Violation { evidence: String },
    /// 판정에 필요한 증거를 얻지 못함
    Inconclusive { reason: String },
}

impl CheckOutcome {
    pub fn violation(evidence: impl Into<String>) -> Self {
        Self::Violation {
            evidence: evidence.into(),
        }
    }

    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self::Inconclusive {
            reason: reason.into(),
        }
    }

    /// 메트릭 레이블용 고정 이름
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Violation { .. } => "violation",
            Self::Inconclusive { .. } => "inconclusive",
        }
    }
}

impl From<CheckOutcome> for TrialOutcome {
    fn from(outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Pass => Self::Pass,
            CheckOutcome::Violation { evidence } => Self::Violation { evidence },
            CheckOutcome::Inconclusive { reason } => Self::Inconclusive { reason },
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Violation { evidence } => write!(f, "violation: {evidence}"),
            Self::Inconclusive { reason } => write!(f, "inconclusive: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_trial_outcome() {
        assert_eq!(TrialOutcome::from(CheckOutcome::Pass), TrialOutcome::Pass);
        assert_eq!(
            TrialOutcome::from(CheckOutcome::inconclusive("driver killed")),
            TrialOutcome::Inconclusive {
                reason: "driver killed".to_owned()
            }
        );
    }
}
