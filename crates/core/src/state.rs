//! 캠페인 상태 -- 현재 단계와 검사 중인 불변식
//!
//! [`CampaignState`]는 오케스트레이터가 소유하고 트라이얼 러너에
//! `&mut`로 빌려줍니다. 한 번에 하나의 트라이얼만 상태를 바꿀 수 있습니다.
//!
//! 외부 도구를 위해 단계 파일과 현재 불변식 파일을 선택적으로 씁니다.

use std::path::Path;

use tracing::debug;

use crate::error::FaultlineError;
use crate::invariant::InvariantReference;
use crate::types::Stage;

/// 캠페인 전역 상태
#[derive(Debug, Clone, Default)]
pub struct CampaignState {
    /// 현재 단계
    pub stage: Stage,
    /// 현재 검사 중인 불변식
    pub current_invariant: Option<InvariantReference>,
    /// 시작된 트라이얼 수
    pub trials_started: u64,
}

impl CampaignState {
    /// 주어진 단계로 새 상태를 생성합니다.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            ..Self::default()
        }
    }

    /// 다음 트라이얼을 위해 불변식을 교체하고 트라이얼 수를 올립니다.
    pub fn begin_trial(&mut self, invariant: InvariantReference) {
        self.current_invariant = Some(invariant);
        self.trials_started += 1;
    }

    /// 트라이얼 종료 후 현재 불변식을 비웁니다.
    pub fn end_trial(&mut self) {
        self.current_invariant = None;
    }

    /// 단계 / 불변식 신호 파일을 씁니다. 경로가 없으면 건너뜁니다.
    pub async fn publish(
        &self,
        stage_file: Option<&Path>,
        invariant_file: Option<&Path>,
    ) -> Result<(), FaultlineError> {
        if let Some(path) = stage_file {
            tokio::fs::write(path, self.stage.as_signal()).await?;
            debug!(path = %path.display(), stage = %self.stage, "published stage signal");
        }
        if let (Some(path), Some(invariant)) = (invariant_file, &self.current_invariant) {
            tokio::fs::write(path, invariant.to_reference_text()).await?;
            debug!(path = %path.display(), invariant = %invariant, "published active invariant");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_and_end_trial() {
        let mut state = CampaignState::new(Stage::Injection);
        state.begin_trial(InvariantReference::named("a"));
        assert_eq!(state.trials_started, 1);
        assert_eq!(state.current_invariant.as_ref().unwrap().name, "a");
        state.end_trial();
        assert!(state.current_invariant.is_none());
        state.begin_trial(InvariantReference::named("b"));
        assert_eq!(state.trials_started, 2);
    }

    #[tokio::test]
    async fn publish_writes_signal_files() {
        let dir = tempfile::tempdir().unwrap();
        let stage = dir.path().join("stage.txt");
        let inv = dir.path().join("invariant-to-test.txt");

        let mut state = CampaignState::new(Stage::Selection);
        state.begin_trial(InvariantReference::parse("rows: const rows 100").unwrap());
        state.publish(Some(&stage), Some(&inv)).await.unwrap();

        assert_eq!(std::fs::read_to_string(&stage).unwrap(), "SELECTION");
        assert_eq!(
            std::fs::read_to_string(&inv).unwrap(),
            "rows: const rows 100"
        );
    }

    #[tokio::test]
    async fn publish_without_paths_is_noop() {
        let state = CampaignState::default();
        state.publish(None, None).await.unwrap();
    }
}
