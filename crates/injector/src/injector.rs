//! 장애 주입 실행 -- 이벤트 적용, 장애 원장, 티어다운 힐링
//!
//! [`FaultInjector`]는 [`FaultEvent`]를 대상에 적용하고, 되돌릴 수 있는
//! 장애를 [`FaultLedger`]에 기록합니다. 트라이얼 종료 시 [`FaultInjector::heal_all`]이
//! 원장을 비우고, [`FaultInjector::lingering_faults`]가 남은 장애를 보고합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use faultline_core::metrics as m;
use faultline_core::types::{CorruptSpec, FaultAction, FaultEvent};
use tracing::{error, info, warn};

use crate::config::FaultInjectorConfig;
use crate::controller::{TargetController, TargetSignal};
use crate::corrupt;
use crate::error::InjectorError;
use crate::registry::{Endpoint, TargetRegistry};

/// 한 번의 주입 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRecord {
    /// 적용한 이벤트
    pub event: FaultEvent,
    /// 체크포인트 해제를 늦출 시간
    pub release_delay: Option<Duration>,
    /// 이미 적용된 상태라 아무것도 하지 않았는지 여부
    pub noop: bool,
}

/// 되돌릴 수 있는 장애의 원장
#[derive(Debug, Default)]
pub struct FaultLedger {
    /// 일시정지된 대상 → PID
    paused: BTreeMap<String, u32>,
    /// 차단된 (대상, 피어) 쌍
    partitions: BTreeMap<(String, String), (Endpoint, Endpoint)>,
    /// 손상된 파일 → (대상, 원본 바이트)
    corrupted: BTreeMap<PathBuf, (String, Vec<u8>)>,
}

impl FaultLedger {
    pub fn is_empty(&self) -> bool {
        self.paused.is_empty() && self.partitions.is_empty() && self.corrupted.is_empty()
    }

    fn describe(&self) -> Vec<String> {
        let mut out = Vec::new();
        out.extend(
            self.paused
                .iter()
                .map(|(name, pid)| format!("paused {name} (pid {pid})")),
        );
        out.extend(
            self.partitions
                .keys()
                .map(|(target, peer)| format!("partition {target} <-> {peer}")),
        );
        out.extend(
            self.corrupted
                .iter()
                .map(|(path, (target, _))| format!("corrupted {} on {target}", path.display())),
        );
        out
    }
}

/// 장애 주입기
///
/// 액션마다 타임아웃을 적용하고, 실패 시 설정된 횟수만큼 선형 백오프로 재시도합니다.
pub struct FaultInjector<C: TargetController> {
    controller: Arc<C>,
    registry: TargetRegistry,
    config: FaultInjectorConfig,
    ledger: FaultLedger,
}

impl<C: TargetController> FaultInjector<C> {
    /// 새 주입기를 생성합니다. 설정의 정적 대상으로 레지스트리를 채웁니다.
    pub fn new(controller: Arc<C>, config: FaultInjectorConfig) -> Self {
        let registry = TargetRegistry::new(config.targets.iter().cloned());
        Self {
            controller,
            registry,
            config,
            ledger: FaultLedger::default(),
        }
    }

    /// 런타임 대상을 등록합니다 (계측 채널의 `target` 보고).
    pub fn register_target(&mut self, name: impl Into<String>, pid: u32) {
        self.registry.register(name, pid);
    }

    /// 대상 레지스트리
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// 현재 원장
    pub fn ledger(&self) -> &FaultLedger {
        &self.ledger
    }

    /// 장애 이벤트 하나를 적용합니다.
    ///
    /// # Errors
    /// - `InjectorError::TargetNotFound`: 대상을 해석할 수 없음
    /// - `InjectorError::TargetUnresponsive`: SIGKILL 후에도 대상이 살아 있음
    /// - `InjectorError::ActionFailed` / `Corrupt`: 재시도 후에도 실패
    pub async fn inject(&mut self, event: &FaultEvent) -> Result<InjectionRecord, InjectorError> {
        info!(
            checkpoint = %event.checkpoint,
            fault_target = %event.target,
            action = %event.action,
            "injecting fault"
        );

        let result = self.apply(event).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(
            m::INJECTOR_INJECTIONS_TOTAL,
            m::LABEL_ACTION => event.action.action_type_name(),
            m::LABEL_RESULT => outcome
        )
        .increment(1);

        match &result {
            Ok(record) if record.noop => info!(
                fault_target = %event.target,
                action = %event.action,
                "fault already in effect, nothing to do"
            ),
            Ok(_) => info!(
                fault_target = %event.target,
                action = %event.action,
                "fault injected"
            ),
            Err(e) => error!(
                fault_target = %event.target,
                action = %event.action,
                error = %e,
                "fault injection failed"
            ),
        }
        result
    }

    async fn apply(&mut self, event: &FaultEvent) -> Result<InjectionRecord, InjectorError> {
        let target = event.target.as_str();
        let mut record = InjectionRecord {
            event: event.clone(),
            release_delay: None,
            noop: false,
        };

        match &event.action {
            FaultAction::Kill => {
                let pid = self.registry.resolve_pid(target).await?;
                self.kill(target, pid).await?;
                self.ledger.paused.remove(target);
            }
            FaultAction::Pause => {
                if self.ledger.paused.contains_key(target) {
                    record.noop = true;
                } else {
                    let pid = self.registry.resolve_pid(target).await?;
                    self.with_retry(target, "pause", || {
                        self.controller.signal(pid, TargetSignal::Stop)
                    })
                    .await?;
                    self.ledger.paused.insert(target.to_owned(), pid);
                }
            }
            FaultAction::Resume => match self.ledger.paused.get(target).copied() {
                None => record.noop = true,
                Some(pid) => {
                    self.with_retry(target, "resume", || {
                        self.controller.signal(pid, TargetSignal::Continue)
                    })
                    .await?;
                    self.ledger.paused.remove(target);
                }
            },
            FaultAction::Delay { duration } => {
                if !self.registry.contains(target) {
                    return Err(InjectorError::TargetNotFound(target.to_owned()));
                }
                record.release_delay = Some(*duration);
            }
            FaultAction::Partition { peers } => {
                record.noop = self.partition(target, peers).await?;
            }
            FaultAction::Corrupt { spec } => {
                record.noop = self.corrupt(target, spec).await?;
            }
        }
        Ok(record)
    }

    /// SIGKILL 후 유예 시간 안에 종료되는지 확인합니다.
    ///
    /// 시그널이 전달된 뒤에는 재시도하지 않습니다.
    async fn kill(&self, target: &str, pid: u32) -> Result<(), InjectorError> {
        match self
            .with_retry(target, "kill", || {
                self.controller.signal(pid, TargetSignal::Kill)
            })
            .await
        {
            Ok(()) => {}
            // 이미 종료된 대상은 kill의 목적을 달성한 것으로 봄
            Err(InjectorError::ProcessGone { .. }) => {
                warn!(fault_target = target, pid, "kill target already exited");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let deadline = tokio::time::Instant::now() + self.config.kill_grace();
        loop {
            if !self.controller.is_alive(pid).await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(InjectorError::TargetUnresponsive {
                    target: target.to_owned(),
                    reason: format!(
                        "pid {pid} still alive {}ms after SIGKILL",
                        self.config.kill_grace_ms
                    ),
                });
            }
            tokio::time::sleep(self.config.kill_poll_interval()).await;
        }
    }

    /// 피어마다 차단을 적용합니다. 모두 이미 차단되어 있으면 `true`.
    async fn partition(
        &mut self,
        target: &str,
        peers: &BTreeSet<String>,
    ) -> Result<bool, InjectorError> {
        let target_ep = self.registry.endpoint(target)?;
        let mut applied = 0usize;

        for peer in peers {
            let key = (target.to_owned(), peer.clone());
            if self.ledger.partitions.contains_key(&key) {
                continue;
            }
            let peer_ep = self.registry.endpoint(peer)?;
            self.with_retry(target, "partition", || {
                self.controller.partition(&target_ep, &peer_ep)
            })
            .await?;
            self.ledger
                .partitions
                .insert(key, (target_ep.clone(), peer_ep));
            applied += 1;
        }
        Ok(applied == 0)
    }

    /// 파일을 손상시킵니다. 같은 파일의 원본은 처음 한 번만 백업합니다.
    ///
    /// 백업은 쓰기 전에 원장에 들어가므로 쓰기가 실패하거나 시간을 넘겨도
    /// 힐링이 원본을 되돌립니다.
    async fn corrupt(&mut self, target: &str, spec: &CorruptSpec) -> Result<bool, InjectorError> {
        if !self.registry.contains(target) {
            return Err(InjectorError::TargetNotFound(target.to_owned()));
        }
        let path = self.registry.resolve_path(target, spec.path());
        let timed_out = || InjectorError::Corrupt {
            path: path.display().to_string(),
            reason: "action timed out".to_owned(),
        };

        let current = tokio::time::timeout(self.config.action_timeout(), corrupt::snapshot(&path))
            .await
            .map_err(|_| timed_out())??;
        let corrupted = corrupt::corrupted(&path, &current, spec)?;

        self.ledger
            .corrupted
            .entry(path.clone())
            .or_insert_with(|| (target.to_owned(), current));

        // 손상은 멱등이 아니므로 재시도하지 않음
        tokio::time::timeout(
            self.config.action_timeout(),
            corrupt::apply(&path, &corrupted, spec),
        )
        .await
        .map_err(|_| timed_out())??;
        Ok(false)
    }

    /// 재시도 로직을 포함한 액션 실행
    ///
    /// `ProcessGone`은 재시도해도 달라지지 않으므로 즉시 반환합니다.
    async fn with_retry<F, Fut>(
        &self,
        target: &str,
        action: &str,
        mut op: F,
    ) -> Result<(), InjectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), InjectorError>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.retry_max_attempts {
            if attempt > 0 {
                let backoff = self.config.retry_backoff_base() * attempt;
                warn!(
                    fault_target = target,
                    action,
                    attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying fault action"
                );
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(self.config.action_timeout(), op()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e @ InjectorError::ProcessGone { .. })) => return Err(e),
                Ok(Err(e)) => last_error = Some(e),
                Err(_elapsed) => {
                    last_error = Some(InjectorError::ActionFailed {
                        target: target.to_owned(),
                        action: action.to_owned(),
                        reason: "action timed out".to_owned(),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| InjectorError::ActionFailed {
            target: target.to_owned(),
            action: action.to_owned(),
            reason: "unknown error".to_owned(),
        }))
    }

    /// 원장에 남은 모든 장애를 되돌립니다.
    ///
    /// 개별 실패가 있어도 나머지를 계속 처리하며, 실패 목록을 반환합니다.
    /// 실패한 항목은 원장에 남아 [`lingering_faults`](Self::lingering_faults)에 보고됩니다.
    pub async fn heal_all(&mut self) -> Vec<String> {
        if self.ledger.is_empty() {
            return Vec::new();
        }
        info!(faults = ?self.ledger.describe(), "healing reversible faults");
        let mut failures = Vec::new();

        let paused = std::mem::take(&mut self.ledger.paused);
        for (name, pid) in paused {
            let result = self
                .with_retry(&name, "resume", || {
                    self.controller.signal(pid, TargetSignal::Continue)
                })
                .await;
            match result {
                // 이미 종료된 프로세스는 재개할 것이 없음
                Ok(()) | Err(InjectorError::ProcessGone { .. }) => {}
                Err(e) => {
                    failures.push(format!("resume {name}: {e}"));
                    self.ledger.paused.insert(name, pid);
                }
            }
        }

        let partitions = std::mem::take(&mut self.ledger.partitions);
        for (key, (target_ep, peer_ep)) in partitions {
            let result = self
                .with_retry(&key.0, "heal_partition", || {
                    self.controller.heal_partition(&target_ep, &peer_ep)
                })
                .await;
            if let Err(e) = result {
                failures.push(format!("heal partition {} <-> {}: {e}", key.0, key.1));
                self.ledger.partitions.insert(key, (target_ep, peer_ep));
            }
        }

        let corrupted = std::mem::take(&mut self.ledger.corrupted);
        for (path, (target, original)) in corrupted {
            if let Err(e) = corrupt::restore(&path, &original).await {
                failures.push(format!("restore {}: {e}", path.display()));
                self.ledger.corrupted.insert(path, (target, original));
            }
        }

        if !failures.is_empty() {
            metrics::counter!(m::INJECTOR_HEAL_FAILURES_TOTAL).increment(failures.len() as u64);
            error!(failures = ?failures, "some faults could not be healed");
        }
        failures
    }

    /// 힐링 후에도 남아 있는 장애를 설명합니다.
    ///
    /// 원장에 남은 항목 중 실제로 아직 유효한 것만 보고합니다.
    /// 종료된 프로세스의 일시정지와 내용이 원본과 같은 파일은 제외됩니다.
    /// 분할은 제어기로 상태를 확인할 수 없으므로, 힐링에 실패해 원장에 남은
    /// 항목을 그대로 보고합니다.
    pub async fn lingering_faults(&self) -> Vec<String> {
        let mut lingering = Vec::new();
        for (name, pid) in &self.ledger.paused {
            if self.controller.is_alive(*pid).await {
                lingering.push(format!("paused {name} (pid {pid})"));
            }
        }
        lingering.extend(
            self.ledger
                .partitions
                .keys()
                .map(|(target, peer)| format!("partition {target} <-> {peer}")),
        );
        for (path, (target, original)) in &self.ledger.corrupted {
            if !corrupt::is_restored(path, original).await {
                lingering.push(format!("corrupted {} on {target}", path.display()));
            }
        }
        lingering
    }

    /// 다음 트라이얼을 위해 런타임 등록을 지웁니다. 원장은 유지합니다.
    pub fn reset_runtime_targets(&mut self) {
        self.registry.clear_runtime();
    }
}
