//! 캠페인 오케스트레이터 -- 트라이얼을 순차 실행하고 결과를 모음
//!
//! 캠페인마다 [`CampaignState`]를 하나 만들고 트라이얼 러너에 차례로 빌려줍니다.
//! 한 번에 하나의 트라이얼만 실행되며, 한 트라이얼의 실패가 캠페인을 멈추지 않습니다.
//! 캠페인을 멈추는 것은 취소 토큰뿐입니다. 진행 중인 트라이얼은 정리까지 마치고,
//! 남은 트라이얼은 시작하지 않습니다.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use faultline_core::config::FaultlineConfig;
use faultline_core::error::FaultlineError;
use faultline_core::invariant::InvariantReference;
use faultline_core::plan::{FailurePlan, load_invariant_list};
use faultline_core::result::{TrialOutcome, TrialResult};
use faultline_core::state::CampaignState;
use faultline_core::types::{CheckpointId, Stage};
use faultline_injector::{ProcessController, TargetController};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::driver::ScriptCommand;
use crate::report::ResultRecorder;
use crate::trial::{PlanSource, TrialRunner, TrialSpec};

/// 선택 단계에서 쓰는 빈 계획의 ID
pub const SELECTION_PLAN_ID: &str = "selection";

/// 판정별 트라이얼 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub pass: usize,
    pub violation: usize,
    pub inconclusive: usize,
    pub engine_error: usize,
}

impl CampaignSummary {
    fn add(&mut self, outcome: &TrialOutcome) {
        match outcome {
            TrialOutcome::Pass => self.pass += 1,
            TrialOutcome::Violation { .. } => self.violation += 1,
            TrialOutcome::Inconclusive { .. } => self.inconclusive += 1,
            TrialOutcome::EngineError { .. } => self.engine_error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pass + self.violation + self.inconclusive + self.engine_error
    }
}

/// 캠페인 보고서
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    /// 캠페인 단계
    pub stage: Stage,
    /// 실행 순서대로의 트라이얼 결과
    pub results: Vec<TrialResult>,
    pub summary: CampaignSummary,
    /// 기록된 위반 재현 파일
    pub violation_records: Vec<String>,
    /// 시작 시각 (Unix epoch 밀리초)
    pub started_at_ms: u64,
    pub duration_ms: u64,
    /// 취소로 일부 트라이얼을 실행하지 못했는지 여부
    pub interrupted: bool,
}

impl CampaignReport {
    /// 완료된 트라이얼이 하나도 없는지 여부 (모두 엔진 실패)
    ///
    /// 위반이나 판정 불가는 완료로 봅니다. 트라이얼이 없으면 실패가 아닙니다.
    pub fn engine_failed(&self) -> bool {
        !self.results.is_empty() && self.summary.engine_error == self.summary.total()
    }

    pub fn has_violations(&self) -> bool {
        self.summary.violation > 0
    }

    /// 불변식별로 도달한 체크포인트 (처음 보고된 순서, 중복 제거)
    pub fn reachable_checkpoints(&self) -> BTreeMap<String, Vec<CheckpointId>> {
        let mut reachable: BTreeMap<String, Vec<CheckpointId>> = BTreeMap::new();
        for result in &self.results {
            let seen = reachable.entry(result.invariant.clone()).or_default();
            for checkpoint in &result.diagnostics.checkpoints_seen {
                if !seen.contains(checkpoint) {
                    seen.push(checkpoint.clone());
                }
            }
        }
        reachable
    }
}

/// 캠페인 오케스트레이터
pub struct Campaign<C: TargetController> {
    runner: TrialRunner<C>,
    recorder: ResultRecorder,
}

impl Campaign<ProcessController> {
    /// 설정 파일 값으로 실제 프로세스를 제어하는 캠페인을 만듭니다.
    ///
    /// # Errors
    /// 설정이 잘못되었거나 스크립트가 없으면 에러를 반환합니다.
    pub fn from_config(
        core: &FaultlineConfig,
        driver: ScriptCommand,
        cleanup: Option<ScriptCommand>,
    ) -> Result<Self, FaultlineError> {
        let config = EngineConfig::from_core(core)?;
        let controller = Arc::new(ProcessController::new(
            config.injector.partition_command.clone(),
            config.injector.heal_command.clone(),
        ));
        Self::new(&config, controller, driver, cleanup)
    }
}

impl<C: TargetController> Campaign<C> {
    /// 새 캠페인을 생성합니다.
    ///
    /// # Errors
    /// 드라이버나 정리 스크립트 경로가 존재하지 않으면 I/O 에러를 반환합니다.
    pub fn new(
        config: &EngineConfig,
        controller: Arc<C>,
        driver: ScriptCommand,
        cleanup: Option<ScriptCommand>,
    ) -> Result<Self, FaultlineError> {
        config.validate()?;
        driver.verify()?;
        if let Some(cleanup) = &cleanup {
            cleanup.verify()?;
        }
        Ok(Self {
            runner: TrialRunner::new(config, controller, driver, cleanup),
            recorder: ResultRecorder::new(
                config.campaign.result_log.clone(),
                config.campaign.violations_dir.clone(),
            ),
        })
    }

    /// 취소 토큰을 연결합니다 (운영자 중단 신호 등).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.runner = self.runner.with_cancellation(cancel);
        self
    }

    pub fn runner(&self) -> &TrialRunner<C> {
        &self.runner
    }

    /// 계획을 그 계획의 불변식으로 한 번 재실행합니다.
    pub async fn replay(&mut self, plan_path: &Path) -> CampaignReport {
        info!(plan = %plan_path.display(), "replaying failure plan");
        let plan = preload(plan_path).await;
        let mut run = CampaignRun::start(Stage::Injection);
        let source = source_for(plan_path, plan.as_ref());
        if !self.interrupted(&mut run) {
            self.trial(&mut run, TrialSpec::replay(source), plan.as_deref(), None)
                .await;
        }
        run.finish()
    }

    /// 같은 계획의 장애를 불변식마다 재실행합니다.
    ///
    /// 불변식마다 `trial.trials_per_invariant`번 실행하며, 앞선 판정과 무관하게 계속합니다.
    pub async fn run_invariants(
        &mut self,
        plan_path: &Path,
        invariants: &[InvariantReference],
    ) -> CampaignReport {
        let repeats = self.runner.settings().trials_per_invariant;
        info!(
            plan = %plan_path.display(),
            invariants = invariants.len(),
            repeats,
            "campaign started"
        );
        let plan = preload(plan_path).await;
        let mut run = CampaignRun::start(Stage::Injection);

        'invariants: for invariant in invariants {
            for _ in 0..repeats {
                if self.interrupted(&mut run) {
                    break 'invariants;
                }
                let source = source_for(plan_path, plan.as_ref());
                let spec = TrialSpec::with_invariant(source, invariant.clone());
                self.trial(&mut run, spec, plan.as_deref(), Some(invariant))
                    .await;
            }
        }
        run.finish()
    }

    /// 불변식 목록 파일을 읽어 [`run_invariants`](Self::run_invariants)를 실행합니다.
    ///
    /// # Errors
    /// 목록 파일을 읽을 수 없거나 비어 있으면 트라이얼 없이 실패합니다.
    pub async fn run_invariant_file(
        &mut self,
        plan_path: &Path,
        list_path: &Path,
    ) -> Result<CampaignReport, FaultlineError> {
        let invariants = load_invariant_list(list_path).await?;
        Ok(self.run_invariants(plan_path, &invariants).await)
    }

    /// 장애 없이 드라이버를 실행해 불변식마다 도달하는 체크포인트를 모읍니다.
    pub async fn select(&mut self, invariants: &[InvariantReference]) -> CampaignReport {
        info!(invariants = invariants.len(), "selection run started");
        let mut run = CampaignRun::start(Stage::Selection);
        for invariant in invariants {
            if self.interrupted(&mut run) {
                break;
            }
            let plan = Arc::new(FailurePlan {
                id: SELECTION_PLAN_ID.to_owned(),
                invariant: invariant.clone(),
                events: Vec::new(),
                metadata: BTreeMap::new(),
            });
            let spec = TrialSpec::replay(PlanSource::Loaded(plan));
            self.trial(&mut run, spec, None, None).await;
        }
        run.finish()
    }

    async fn trial(
        &mut self,
        run: &mut CampaignRun,
        spec: TrialSpec,
        plan: Option<&FailurePlan>,
        invariant: Option<&InvariantReference>,
    ) {
        let result = self.runner.run(&mut run.state, spec).await;
        if let Some(path) = self.recorder.record(&result, plan, invariant).await {
            run.violation_records.push(path.display().to_string());
        }
        run.push(result);
        self.interrupted(run);
    }

    fn interrupted(&self, run: &mut CampaignRun) -> bool {
        if self.runner.is_cancelled() {
            if !run.report.interrupted {
                warn!(
                    completed = run.report.results.len(),
                    "campaign cancelled, remaining trials skipped"
                );
            }
            run.report.interrupted = true;
        }
        run.report.interrupted
    }
}

/// 한 캠페인 실행 동안의 상태
struct CampaignRun {
    state: CampaignState,
    report: CampaignReport,
    violation_records: Vec<String>,
    started: Instant,
}

impl CampaignRun {
    fn start(stage: Stage) -> Self {
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            state: CampaignState::new(stage),
            report: CampaignReport {
                stage,
                results: Vec::new(),
                summary: CampaignSummary::default(),
                violation_records: Vec::new(),
                started_at_ms,
                duration_ms: 0,
                interrupted: false,
            },
            violation_records: Vec::new(),
            started: Instant::now(),
        }
    }

    fn push(&mut self, result: TrialResult) {
        self.report.summary.add(&result.outcome);
        self.report.results.push(result);
    }

    fn finish(mut self) -> CampaignReport {
        self.report.violation_records = self.violation_records;
        self.report.duration_ms =
            u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let summary = self.report.summary;
        info!(
            stage = %self.report.stage,
            trials = summary.total(),
            pass = summary.pass,
            violation = summary.violation,
            inconclusive = summary.inconclusive,
            engine_error = summary.engine_error,
            "campaign finished"
        );
        self.report
    }
}

/// 계획을 미리 로드합니다. 실패하면 트라이얼마다 경로에서 다시 로드해
/// 로딩 에러가 각 트라이얼의 엔진 에러로 기록되게 합니다.
async fn preload(plan_path: &Path) -> Option<Arc<FailurePlan>> {
    match FailurePlan::load(plan_path).await {
        Ok(plan) => Some(Arc::new(plan)),
        Err(e) => {
            warn!(plan = %plan_path.display(), error = %e, "plan could not be loaded");
            None
        }
    }
}

fn source_for(plan_path: &Path, plan: Option<&Arc<FailurePlan>>) -> PlanSource {
    match plan {
        Some(plan) => PlanSource::Loaded(Arc::clone(plan)),
        None => PlanSource::Path(plan_path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::result::Diagnostics;
    use faultline_injector::MockTargetController;
    use uuid::Uuid;

    fn result(invariant: &str, outcome: TrialOutcome, seen: &[&str]) -> TrialResult {
        TrialResult {
            trial_id: Uuid::new_v4(),
            invariant: invariant.to_owned(),
            plan_id: SELECTION_PLAN_ID.to_owned(),
            outcome,
            diagnostics: Diagnostics {
                checkpoints_seen: seen.iter().map(|s| CheckpointId::from(*s)).collect(),
                ..Diagnostics::default()
            },
            cleanup_warning: None,
            started_at_ms: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut run = CampaignRun::start(Stage::Injection);
        run.push(result("a", TrialOutcome::Pass, &[]));
        run.push(result(
            "b",
            TrialOutcome::EngineError {
                reason: "x".to_owned(),
            },
            &[],
        ));
        let report = run.finish();
        assert_eq!(report.summary.total(), 2);
        assert_eq!(report.summary.pass, 1);
        assert!(!report.engine_failed(), "one trial completed");
        assert!(!report.has_violations());
    }

    #[test]
    fn engine_failed_only_when_no_trial_completed() {
        let mut run = CampaignRun::start(Stage::Injection);
        for name in ["a", "b"] {
            run.push(result(
                name,
                TrialOutcome::EngineError {
                    reason: "channel timeout".to_owned(),
                },
                &[],
            ));
        }
        assert!(run.finish().engine_failed());
    }

    #[test]
    fn empty_report_is_not_an_engine_failure() {
        let report = CampaignRun::start(Stage::Selection).finish();
        assert_eq!(report.summary.total(), 0);
        assert!(!report.engine_failed());
        assert!(!report.interrupted);
    }

    #[tokio::test]
    async fn cancelled_campaign_starts_no_trials() {
        let cancel = CancellationToken::new();
        let mut campaign = Campaign::new(
            &EngineConfig::default(),
            Arc::new(MockTargetController::new()),
            ScriptCommand::shell("true"),
            None,
        )
        .unwrap()
        .with_cancellation(cancel.clone());
        cancel.cancel();

        let report = campaign
            .select(&[
                InvariantReference::named("a"),
                InvariantReference::named("b"),
            ])
            .await;

        assert!(report.results.is_empty());
        assert!(report.interrupted);
        assert!(!report.engine_failed());
    }

    #[test]
    fn reachable_checkpoints_are_deduplicated_in_order() {
        let mut run = CampaignRun::start(Stage::Selection);
        run.push(result("a", TrialOutcome::Pass, &["3", "1", "3"]));
        run.push(result("a", TrialOutcome::Pass, &["2"]));
        let reachable = run.finish().reachable_checkpoints();
        let ids: Vec<&str> = reachable["a"].iter().map(CheckpointId::as_str).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn missing_driver_is_fatal() {
        let err = Campaign::new(
            &EngineConfig::default(),
            Arc::new(MockTargetController::new()),
            ScriptCommand::new("/nonexistent/driver.sh"),
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, FaultlineError::Io(_)));
    }

    #[tokio::test]
    async fn missing_invariant_list_is_fatal() {
        let mut campaign = Campaign::new(
            &EngineConfig::default(),
            Arc::new(MockTargetController::new()),
            ScriptCommand::shell("true"),
            None,
        )
        .unwrap();
        let err = campaign
            .run_invariant_file(Path::new("/nonexistent/plan"), Path::new("/nonexistent/list"))
            .await
            .unwrap_err();
        assert!(matches!(err, FaultlineError::Parse(_)));
    }
}
