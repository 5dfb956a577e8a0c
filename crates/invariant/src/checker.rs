//! 불변식 검사기

use faultline_core::error::InvariantError;
use faultline_core::invariant::InvariantReference;
use faultline_core::metrics as m;
use tracing::{info, warn};

use crate::config::CheckerConfig;
use crate::observation::TrialObservation;
use crate::outcome::CheckOutcome;
use crate::strategy::ResolvedStrategy;

/// 불변식 검사기
///
/// 참조를 전략으로 해석하고, 시간 상한 안에서 증거를 모아 판정합니다.
#[derive(Debug, Clone, Default)]
pub struct InvariantChecker {
    config: CheckerConfig,
}

impl InvariantChecker {
    pub fn new(config: CheckerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// 참조를 해석만 합니다. 트라이얼 시작 전 인자 오류를 확인할 때 씁니다.
    pub fn resolve(
        &self,
        reference: &InvariantReference,
    ) -> Result<ResolvedStrategy, InvariantError> {
        ResolvedStrategy::resolve(reference, &self.config)
    }

    /// 드라이버 출력에서 감시할 마커 목록
    ///
    /// 설정의 실패 마커는 항상 포함하며, 참조가 다른 마커를 쓰면 함께 반환합니다.
    pub fn watched_markers(&self, reference: &InvariantReference) -> Vec<String> {
        let mut markers = vec![self.config.failure_marker.clone()];
        let custom = self
            .resolve(reference)
            .ok()
            .and_then(|s| s.watched_marker().map(str::to_owned));
        if let Some(marker) = custom {
            if !markers.contains(&marker) {
                markers.push(marker);
            }
        }
        markers
    }

    /// 불변식을 판정합니다.
    ///
    /// # Errors
    /// 참조를 해석할 수 없으면 `InvariantError`를 반환합니다.
    /// 이 경우 SUT에 대한 판정이 아니므로 호출자는 엔진 실패로 처리합니다.
    pub async fn check(
        &self,
        reference: &InvariantReference,
        observation: &TrialObservation,
    ) -> Result<CheckOutcome, InvariantError> {
        let strategy = self.resolve(reference).inspect_err(|e| {
            warn!(invariant = %reference, error = %e, "cannot resolve invariant");
        })?;

        let outcome = strategy.evaluate(observation).await;

        metrics::counter!(
            m::CHECKER_CHECKS_TOTAL,
            m::LABEL_STRATEGY => strategy.label(),
            m::LABEL_OUTCOME => outcome.kind()
        )
        .increment(1);
        info!(
            invariant = %reference,
            strategy = strategy.label(),
            kind = %strategy.kind(),
            outcome = %outcome,
            "invariant checked"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(text: &str) -> InvariantReference {
        InvariantReference::parse(text).unwrap()
    }

    #[tokio::test]
    async fn default_reference_checks_failure_marker() {
        let checker = InvariantChecker::default();
        let obs = TrialObservation {
            exit_code: Some(0),
            output_tail: vec!["ok".to_owned()],
            ..Default::default()
        };
        assert_eq!(
            checker.check(&reference("no-data-loss"), &obs).await.unwrap(),
            CheckOutcome::Pass
        );
    }

    #[tokio::test]
    async fn unavailable_evidence_is_never_pass() {
        let checker = InvariantChecker::default();
        let obs = TrialObservation {
            terminated_by_engine: true,
            ..Default::default()
        };
        for text in [
            "a",
            "b: exit-status",
            "c: const rows 1",
            "d: reaches 9",
            "e: ordered 1 2",
            "f: exclusive role leader",
        ] {
            let outcome = checker.check(&reference(text), &obs).await.unwrap();
            assert!(
                matches!(outcome, CheckOutcome::Inconclusive { .. }),
                "{text}: {outcome}"
            );
        }
    }

    #[tokio::test]
    async fn invalid_argument_is_an_error() {
        let checker = InvariantChecker::default();
        let err = checker
            .check(&reference("x: reaches"), &TrialObservation::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InvariantError::InvalidArgument { .. }));
    }

    #[test]
    fn watched_markers_include_custom_marker_once() {
        let checker = InvariantChecker::default();
        assert_eq!(
            checker.watched_markers(&reference("x: output-marker PANIC")),
            vec!["test has failed".to_owned(), "PANIC".to_owned()]
        );
        assert_eq!(
            checker.watched_markers(&reference("x")),
            vec!["test has failed".to_owned()]
        );
    }
}
