//! 트라이얼 러너 -- 한 번의 (드라이버, 정리 스크립트, 실패 계획) 실행
//!
//! # 상태 전이
//!
//! ```text
//! Init -> PlanLoaded -> DriverLaunched -> AwaitingCheckpoint <-> Injecting
//!                                               |
//!                                         DriverCompleting
//!                                               |
//!              (드라이버 종료는 어느 단계에서든) Checking -> CleaningUp -> Done
//!
//! 엔진 실패 (계획 로딩, 주입, 채널 시간 초과, 취소) --> CleaningUp -> Aborted
//! ```
//!
//! `CleaningUp`은 모든 경로에서 실행됩니다. 힐링과 정리 스크립트는
//! 트라이얼마다 정확히 한 번 실행됩니다. 취소 토큰([`TrialRunner::with_cancellation`])이
//! 취소되면 드라이버를 종료하고 같은 경로로 정리합니다.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use faultline_core::error::ChannelError;
use faultline_core::invariant::InvariantReference;
use faultline_core::metrics as m;
use faultline_core::plan::FailurePlan;
use faultline_core::result::{Diagnostics, TrialOutcome, TrialResult};
use faultline_core::state::CampaignState;
use faultline_core::types::{CheckpointId, FaultEvent, Stage};
use faultline_injector::{FaultInjector, TargetController};
use faultline_invariant::{InvariantChecker, TrialObservation};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{ChannelEvent, ChannelReports, InstrumentationChannel, TcpChannel};
use crate::cleanup::CleanupGuard;
use crate::config::{CampaignPaths, ChannelSettings, EngineConfig, TrialSettings};
use crate::driver::{DriverEnv, DriverExit, DriverProcess, OutputCapture, ScriptCommand};

/// 드라이버 종료 후 출력 읽기를 기다리는 시간
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// 취소된 트라이얼의 엔진 에러 사유
pub const CANCELLED_REASON: &str = "trial cancelled by shutdown request";

/// 트라이얼 러너 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Init,
    PlanLoaded,
    DriverLaunched,
    AwaitingCheckpoint,
    Injecting,
    DriverCompleting,
    Checking,
    CleaningUp,
    Done,
    Aborted,
}

impl TrialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::PlanLoaded => "plan_loaded",
            Self::DriverLaunched => "driver_launched",
            Self::AwaitingCheckpoint => "awaiting_checkpoint",
            Self::Injecting => "injecting",
            Self::DriverCompleting => "driver_completing",
            Self::Checking => "checking",
            Self::CleaningUp => "cleaning_up",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }

    /// 종료 상태인지 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 트라이얼에 쓸 계획
#[derive(Debug, Clone)]
pub enum PlanSource {
    /// 트라이얼 시작 시 파일에서 로드
    Path(PathBuf),
    /// 이미 로드된 계획 (여러 트라이얼이 공유)
    Loaded(Arc<FailurePlan>),
}

impl PlanSource {
    fn label(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Loaded(plan) => plan.id.clone(),
        }
    }
}

/// 한 트라이얼의 입력
#[derive(Debug, Clone)]
pub struct TrialSpec {
    pub plan: PlanSource,
    /// 계획의 불변식 대신 검사할 불변식
    pub invariant: Option<InvariantReference>,
}

impl TrialSpec {
    /// 계획의 불변식을 그대로 쓰는 트라이얼
    pub fn replay(plan: PlanSource) -> Self {
        Self {
            plan,
            invariant: None,
        }
    }

    /// 불변식을 바꿔 끼운 트라이얼
    pub fn with_invariant(plan: PlanSource, invariant: InvariantReference) -> Self {
        Self {
            plan,
            invariant: Some(invariant),
        }
    }
}

/// 아직 발생하지 않은 이벤트 큐
///
/// 머리의 이벤트와 같은 체크포인트가 보고될 때만 이벤트를 꺼냅니다.
/// 순서가 뒤바뀐 보고는 일치하지 않는 것으로 취급합니다.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    pending: VecDeque<FaultEvent>,
}

impl EventQueue {
    pub(crate) fn new(events: impl IntoIterator<Item = FaultEvent>) -> Self {
        Self {
            pending: events.into_iter().collect(),
        }
    }

    /// 머리에서부터 `checkpoint`에 해당하는 이벤트를 모두 꺼냅니다.
    pub(crate) fn take_due(&mut self, checkpoint: &CheckpointId) -> Vec<FaultEvent> {
        let mut due = Vec::new();
        while self
            .pending
            .front()
            .is_some_and(|event| &event.checkpoint == checkpoint)
        {
            if let Some(event) = self.pending.pop_front() {
                due.push(event);
            }
        }
        due
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn into_remaining(self) -> Vec<FaultEvent> {
        self.pending.into()
    }
}

/// 트라이얼 진행 중 모으는 기록
struct TrialRecord {
    trial_id: Uuid,
    plan_id: String,
    invariant: String,
    env: DriverEnv,
    diagnostics: Diagnostics,
    observation: TrialObservation,
}

/// 러너 내부 실패 (엔진 에러로 기록)
type StepResult<T> = Result<T, String>;

/// 트라이얼 러너
///
/// 대상 제어기 `C`는 장애 주입기에, 채널은 트라이얼마다 새로 바인드합니다.
pub struct TrialRunner<C: TargetController> {
    settings: TrialSettings,
    channel: ChannelSettings,
    signals: CampaignPaths,
    driver: ScriptCommand,
    cleanup: Option<ScriptCommand>,
    injector: FaultInjector<C>,
    checker: InvariantChecker,
    cancel: CancellationToken,
    state: TrialState,
}

impl<C: TargetController> TrialRunner<C> {
    /// 새 러너를 생성합니다.
    pub fn new(
        config: &EngineConfig,
        controller: Arc<C>,
        driver: ScriptCommand,
        cleanup: Option<ScriptCommand>,
    ) -> Self {
        Self {
            settings: config.trial.clone(),
            channel: config.channel.clone(),
            signals: config.campaign.clone(),
            driver,
            cleanup,
            injector: FaultInjector::new(controller, config.injector.clone()),
            checker: InvariantChecker::new(config.checker.clone()),
            cancel: CancellationToken::new(),
            state: TrialState::Init,
        }
    }

    /// 외부 취소 토큰을 연결합니다. 취소되면 진행 중인 트라이얼은
    /// 드라이버를 종료하고 힐링과 정리 스크립트를 거쳐 엔진 에러로 끝납니다.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 마지막 트라이얼이 끝난 상태
    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn injector(&self) -> &FaultInjector<C> {
        &self.injector
    }

    pub fn settings(&self) -> &TrialSettings {
        &self.settings
    }

    /// TCP 채널을 바인드하고 트라이얼을 실행합니다.
    pub async fn run(&mut self, campaign: &mut CampaignState, spec: TrialSpec) -> TrialResult {
        let channel = TcpChannel::bind(&self.channel).await.map(|channel| {
            let addr = channel.local_addr().to_string();
            (channel, addr)
        });
        self.execute(campaign, spec, channel).await
    }

    /// 주어진 채널로 트라이얼을 실행합니다.
    ///
    /// `channel_addr`는 드라이버에 `FAULTLINE_CHANNEL_ADDR`로 전달됩니다.
    pub async fn run_with_channel<Ch: InstrumentationChannel>(
        &mut self,
        campaign: &mut CampaignState,
        spec: TrialSpec,
        channel: Ch,
        channel_addr: impl Into<String>,
    ) -> TrialResult {
        self.execute(campaign, spec, Ok((channel, channel_addr.into())))
            .await
    }

    async fn execute<Ch: InstrumentationChannel>(
        &mut self,
        campaign: &mut CampaignState,
        spec: TrialSpec,
        channel: Result<(Ch, String), ChannelError>,
    ) -> TrialResult {
        let trial_id = Uuid::new_v4();
        let started = Instant::now();
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        self.state = TrialState::Init;

        let label = spec.plan.label();
        let mut record = TrialRecord {
            trial_id,
            plan_id: label.clone(),
            invariant: spec
                .invariant
                .as_ref()
                .map(|i| i.name.clone())
                .unwrap_or_default(),
            env: DriverEnv {
                channel_addr: String::new(),
                trial_id: trial_id.to_string(),
                invariant: String::new(),
                stage: campaign.stage.as_signal().to_owned(),
                plan_id: label,
            },
            diagnostics: Diagnostics::default(),
            observation: TrialObservation {
                trial_id: trial_id.to_string(),
                ..TrialObservation::default()
            },
        };
        let guard = CleanupGuard::new(
            self.cleanup.clone(),
            record.env.clone(),
            self.settings.cleanup_timeout,
        );
        info!(trial_id = %trial_id, plan = %record.plan_id, stage = %campaign.stage, "trial started");

        let outcome = match self.attempt(campaign, spec, channel, &mut record).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                warn!(trial_id = %trial_id, reason = %reason, "trial aborted by engine failure");
                TrialOutcome::EngineError { reason }
            }
        };

        // 모든 경로가 여기를 지남
        self.transition(TrialState::CleaningUp);
        let failures = self.injector.heal_all().await;
        if !failures.is_empty() {
            warn!(trial_id = %trial_id, failures = ?failures, "teardown healing incomplete");
        }
        record.diagnostics.lingering_faults = self.injector.lingering_faults().await;
        self.injector.reset_runtime_targets();
        let cleanup_warning = guard.with_env(record.env.clone()).run().await;
        campaign.end_trial();

        self.transition(if outcome.is_engine_error() {
            TrialState::Aborted
        } else {
            TrialState::Done
        });
        record.diagnostics.final_state = self.state.to_string();

        let elapsed = started.elapsed();
        metrics::counter!(m::TRIALS_TOTAL, m::LABEL_OUTCOME => outcome.kind()).increment(1);
        metrics::histogram!(m::TRIAL_DURATION_SECONDS).record(elapsed.as_secs_f64());

        let result = TrialResult {
            trial_id,
            invariant: record.invariant,
            plan_id: record.plan_id,
            outcome,
            diagnostics: record.diagnostics,
            cleanup_warning,
            started_at_ms,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            trial_id = %trial_id,
            invariant = %result.invariant,
            outcome = result.outcome.kind(),
            duration_ms = result.duration_ms,
            "trial finished"
        );
        result
    }

    /// 계획 로딩부터 판정까지. 엔진 실패는 `Err(reason)`으로 돌려줍니다.
    async fn attempt<Ch: InstrumentationChannel>(
        &mut self,
        campaign: &mut CampaignState,
        spec: TrialSpec,
        channel: Result<(Ch, String), ChannelError>,
        record: &mut TrialRecord,
    ) -> StepResult<TrialOutcome> {
        let plan = match spec.plan {
            PlanSource::Path(path) => FailurePlan::load(&path)
                .await
                .map(Arc::new)
                .map_err(|e| format!("failed to load plan {}: {e}", path.display()))?,
            PlanSource::Loaded(plan) => plan,
        };
        self.transition(TrialState::PlanLoaded);

        let invariant = spec.invariant.unwrap_or_else(|| plan.invariant.clone());
        record.plan_id = plan.id.clone();
        record.invariant = invariant.name.clone();
        record.env.plan_id = plan.id.clone();
        record.env.invariant = invariant.to_reference_text();

        campaign.begin_trial(invariant.clone());
        campaign
            .publish(
                self.signals.stage_file.as_deref(),
                self.signals.invariant_file.as_deref(),
            )
            .await
            .map_err(|e| format!("failed to publish campaign signals: {e}"))?;

        // 트라이얼 전에 인자 오류를 걸러냄
        self.checker
            .resolve(&invariant)
            .map_err(|e| format!("cannot evaluate invariant: {e}"))?;

        if self.cancel.is_cancelled() {
            return Err(CANCELLED_REASON.to_owned());
        }
        let (mut channel, channel_addr) =
            channel.map_err(|e| format!("instrumentation channel unavailable: {e}"))?;
        record.env.channel_addr = channel_addr;

        let mut queue = match campaign.stage {
            Stage::Selection => EventQueue::default(),
            Stage::Injection => EventQueue::new(plan.events.iter().cloned()),
        };

        let capture = OutputCapture::new(
            self.settings.output_tail_lines,
            self.checker.watched_markers(&invariant),
        );
        let mut driver = match DriverProcess::spawn(&self.driver, &record.env, capture) {
            Ok(driver) => driver,
            Err(e) => {
                channel.shutdown().await;
                return Err(e.to_string());
            }
        };
        self.transition(TrialState::DriverLaunched);

        let deadline = Instant::now() + self.settings.trial_timeout;
        let exit = match self
            .coordinate(&mut channel, &mut driver, &mut queue, deadline, record)
            .await
        {
            Ok(exit) => exit,
            Err(reason) => {
                record.observation.terminated_by_engine = true;
                let exit = driver.terminate().await;
                channel.shutdown().await;
                self.collect_driver(driver, exit, record).await;
                return Err(reason);
            }
        };

        let skipped = queue.into_remaining();
        if !skipped.is_empty() {
            metrics::counter!(m::TRIAL_EVENTS_SKIPPED_TOTAL).increment(skipped.len() as u64);
            info!(
                trial_id = %record.trial_id,
                skipped = skipped.len(),
                "driver exited before remaining events fired"
            );
        }
        record.diagnostics.events_skipped = skipped;

        self.settle(&mut channel, record).await;
        channel.shutdown().await;
        self.collect_driver(driver, Some(exit), record).await;

        self.transition(TrialState::Checking);
        if self.settings.heal_before_check {
            let failures = self.injector.heal_all().await;
            if !failures.is_empty() {
                warn!(trial_id = %record.trial_id, failures = ?failures, "healing before check incomplete");
            }
        }
        let outcome = self
            .checker
            .check(&invariant, &record.observation)
            .await
            .map_err(|e| format!("cannot evaluate invariant: {e}"))?;
        Ok(outcome.into())
    }

    /// 체크포인트와 드라이버 종료를 기다리며 이벤트를 발생시킵니다.
    async fn coordinate<Ch: InstrumentationChannel>(
        &mut self,
        channel: &mut Ch,
        driver: &mut DriverProcess,
        queue: &mut EventQueue,
        deadline: Instant,
        record: &mut TrialRecord,
    ) -> StepResult<DriverExit> {
        let mut channel_open = true;
        let cancel = self.cancel.clone();
        loop {
            if queue.is_empty() {
                if self.state != TrialState::DriverCompleting {
                    self.transition(TrialState::DriverCompleting);
                }
            } else {
                self.transition(TrialState::AwaitingCheckpoint);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out());
            }
            let wait = if queue.is_empty() {
                deadline - now
            } else {
                self.channel.checkpoint_timeout.min(deadline - now)
            };

            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(trial_id = %record.trial_id, "cancellation requested, stopping trial");
                    return Err(CANCELLED_REASON.to_owned());
                }
                exit = driver.wait() => match exit {
                    Ok(exit) => Ok(ChannelEvent::DriverExited(exit)),
                    Err(e) => return Err(format!("failed to wait for driver: {e}")),
                },
                reported = channel.await_checkpoint(wait), if channel_open => {
                    reported.map(ChannelEvent::Checkpoint)
                }
                _ = tokio::time::sleep_until(deadline), if !channel_open => {
                    return Err(self.timed_out());
                }
            };
            self.absorb(channel.drain_reports(), record);

            match event {
                Ok(ChannelEvent::DriverExited(exit)) => {
                    debug!(trial_id = %record.trial_id, exit = ?exit, "driver exited");
                    return Ok(exit);
                }
                Ok(ChannelEvent::Checkpoint(checkpoint)) => {
                    record.diagnostics.checkpoints_seen.push(checkpoint.clone());
                    record.observation.checkpoints_seen.push(checkpoint.clone());
                    let due = queue.take_due(&checkpoint);
                    if !due.is_empty() {
                        self.fire(&due, record).await?;
                    }
                    if let Err(e) = channel.release(&checkpoint) {
                        warn!(checkpoint = %checkpoint, error = %e, "release failed");
                    }
                }
                Err(ChannelError::Closed(reason)) => {
                    debug!(reason = %reason, "channel closed, waiting for driver only");
                    channel_open = false;
                }
                Err(ChannelError::Timeout { waited_ms }) => {
                    if queue.is_empty() {
                        return Err(self.timed_out());
                    }
                    return Err(format!(
                        "channel timeout: no checkpoint reported within {waited_ms}ms"
                    ));
                }
                Err(e) => return Err(format!("channel failure: {e}")),
            }
        }
    }

    /// 같은 체크포인트의 이벤트를 선언 순서대로 발생시키고, 모인 지연만큼 해제를 늦춥니다.
    async fn fire(&mut self, due: &[FaultEvent], record: &mut TrialRecord) -> StepResult<()> {
        self.transition(TrialState::Injecting);
        let mut delay = Duration::ZERO;
        for event in due {
            let injected = self
                .injector
                .inject(event)
                .await
                .map_err(|e| format!("injection of {event} failed: {e}"))?;
            delay += injected.release_delay.unwrap_or_default();
            record.diagnostics.events_fired.push(event.clone());
        }
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "holding checkpoint release");
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// 드라이버 종료 후 늦은 보고를 모읍니다. 늦은 체크포인트는 바로 해제합니다.
    async fn settle<Ch: InstrumentationChannel>(
        &mut self,
        channel: &mut Ch,
        record: &mut TrialRecord,
    ) {
        let until = Instant::now() + self.settings.settle;
        let cancel = self.cancel.clone();
        loop {
            let now = Instant::now();
            if now >= until {
                break;
            }
            let reported = tokio::select! {
                _ = cancel.cancelled() => break,
                reported = channel.await_checkpoint(until - now) => reported,
            };
            match reported {
                Ok(checkpoint) => {
                    record.diagnostics.checkpoints_seen.push(checkpoint.clone());
                    record.observation.checkpoints_seen.push(checkpoint.clone());
                    if let Err(e) = channel.release(&checkpoint) {
                        debug!(checkpoint = %checkpoint, error = %e, "late release failed");
                    }
                }
                Err(_) => break,
            }
        }
        self.absorb(channel.drain_reports(), record);
    }

    fn absorb(&mut self, reports: ChannelReports, record: &mut TrialRecord) {
        for (name, pid) in reports.targets {
            self.injector.register_target(name, pid);
        }
        for (variable, value) in reports.state {
            record.diagnostics.state.insert(variable.clone(), value.clone());
            record.observation.state.insert(variable, value);
        }
    }

    async fn collect_driver(
        &self,
        driver: DriverProcess,
        exit: Option<DriverExit>,
        record: &mut TrialRecord,
    ) {
        let output = driver.finish_output(OUTPUT_DRAIN_GRACE).await;
        let tail = output.tail();
        record.observation.output_tail = tail.clone();
        record.observation.marker_hits = output.marker_hits().clone();
        record.diagnostics.output_tail = tail;
        if let Some(exit) = exit {
            record.observation.exit_code = exit.code;
            record.observation.signaled = exit.signaled;
            record.diagnostics.driver_exit_code = exit.code;
            record.diagnostics.driver_signaled = exit.signaled;
        }
    }

    fn timed_out(&self) -> String {
        format!(
            "trial timed out after {}s",
            self.settings.trial_timeout.as_secs()
        )
    }

    fn transition(&mut self, next: TrialState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "trial state transition");
            self.state = next;
        }
    }
}
