//! 트라이얼 관찰 -- 검사기가 증거를 모으는 원천
//!
//! 트라이얼 러너가 드라이버 종료 후 채워서 넘깁니다.

use std::collections::BTreeMap;

use faultline_core::types::CheckpointId;

/// 한 트라이얼에서 관찰한 내용
#[derive(Debug, Clone, Default)]
pub struct TrialObservation {
    /// 트라이얼 ID (프로브 환경변수로 전달)
    pub trial_id: String,
    /// 드라이버 출력 마지막 부분
    pub output_tail: Vec<String>,
    /// 감시 마커 → 처음 일치한 출력 줄 (tail 밖으로 밀려난 줄도 포함)
    pub marker_hits: BTreeMap<String, String>,
    /// 드라이버 종료 코드 (시그널 종료나 미종료면 `None`)
    pub exit_code: Option<i32>,
    /// 드라이버가 시그널로 종료되었는지 여부
    pub signaled: bool,
    /// 엔진이 드라이버를 강제 종료했는지 여부 (시간 초과, 취소)
    pub terminated_by_engine: bool,
    /// 보고된 체크포인트 (보고 순서)
    pub checkpoints_seen: Vec<CheckpointId>,
    /// SUT가 보고한 상태 변수
    pub state: BTreeMap<String, String>,
}

impl TrialObservation {
    /// 드라이버가 스스로 종료 코드를 남기고 끝났는지 여부
    pub fn exited_normally(&self) -> bool {
        self.exit_code.is_some() && !self.signaled && !self.terminated_by_engine
    }

    /// 마커가 포함된 출력 줄을 찾습니다.
    pub fn find_marker(&self, marker: &str) -> Option<&str> {
        if let Some(line) = self.marker_hits.get(marker) {
            return Some(line);
        }
        self.output_tail
            .iter()
            .find(|line| line.contains(marker))
            .map(String::as_str)
    }

    /// 체크포인트가 처음 보고된 위치
    pub fn first_position(&self, checkpoint: &str) -> Option<usize> {
        self.checkpoints_seen
            .iter()
            .position(|cp| cp.as_str() == checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_hits_take_precedence_over_tail() {
        let mut obs = TrialObservation {
            output_tail: vec!["tail: test has failed".to_owned()],
            ..Default::default()
        };
        assert_eq!(
            obs.find_marker("test has failed"),
            Some("tail: test has failed")
        );
        obs.marker_hits
            .insert("test has failed".to_owned(), "early: test has failed".to_owned());
        assert_eq!(
            obs.find_marker("test has failed"),
            Some("early: test has failed")
        );
        assert_eq!(obs.find_marker("absent"), None);
    }

    #[test]
    fn normal_exit_requires_code_and_no_engine_kill() {
        let mut obs = TrialObservation {
            exit_code: Some(1),
            ..Default::default()
        };
        assert!(obs.exited_normally());
        obs.terminated_by_engine = true;
        assert!(!obs.exited_normally());
        let obs = TrialObservation {
            signaled: true,
            ..Default::default()
        };
        assert!(!obs.exited_normally());
    }

    #[test]
    fn first_position_uses_first_report() {
        let obs = TrialObservation {
            checkpoints_seen: ["1", "2", "1"].into_iter().map(CheckpointId::from).collect(),
            ..Default::default()
        };
        assert_eq!(obs.first_position("1"), Some(0));
        assert_eq!(obs.first_position("2"), Some(1));
        assert_eq!(obs.first_position("3"), None);
    }
}
