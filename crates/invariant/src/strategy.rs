//! 검사 전략
//!
//! 모든 전략은 같은 능력 집합을 구현합니다.
//!
//! - `collect_state`: 관찰에서 증거를 모음 (없으면 [`Unavailable`])
//! - `compare_expected`: 증거를 기대값과 비교
//! - `time_bound`: 증거 수집 시간 상한
//!
//! 참조는 [`ResolvedStrategy::resolve`]에서 구체 전략으로 바뀝니다.

use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use faultline_core::error::InvariantError;
use faultline_core::invariant::{InvariantReference, StrategyToken, split_node_id};
use tracing::debug;

use crate::config::CheckerConfig;
use crate::observation::TrialObservation;
use crate::outcome::CheckOutcome;

/// 관찰만 읽는 전략의 시간 상한
const LOCAL_TIME_BOUND: Duration = Duration::from_secs(5);

/// 프로브 출력 중 증거로 남길 최대 줄 수
const PROBE_EVIDENCE_LINES: usize = 20;

/// 불변식 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    Ordering,
    Durability,
    MutualExclusion,
    Liveness,
    Safety,
}

impl InvariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ordering => "ordering",
            Self::Durability => "durability",
            Self::MutualExclusion => "mutual_exclusion",
            Self::Liveness => "liveness",
            Self::Safety => "safety",
        }
    }
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 증거를 얻을 수 없는 이유
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unavailable(pub String);

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// 검사 전략 trait
///
/// `Send + Sync`이므로 비동기 컨텍스트에서 공유할 수 있습니다.
pub trait InvariantStrategy: Send + Sync {
    /// 전략이 모으는 증거
    type Evidence: Send + fmt::Debug;

    /// 불변식 종류
    fn kind(&self) -> InvariantKind;

    /// 관찰에서 증거를 모읍니다.
    fn collect_state(
        &self,
        observation: &TrialObservation,
    ) -> impl Future<Output = Result<Self::Evidence, Unavailable>> + Send;

    /// 증거를 기대값과 비교합니다.
    fn compare_expected(&self, evidence: &Self::Evidence) -> CheckOutcome;

    /// 증거 수집 시간 상한
    fn time_bound(&self) -> Duration {
        LOCAL_TIME_BOUND
    }
}

/// 시간 상한 안에서 증거를 모으고 판정합니다.
///
/// 증거가 없거나 시간을 넘기면 `Inconclusive`입니다.
pub async fn evaluate<S: InvariantStrategy>(
    strategy: &S,
    observation: &TrialObservation,
) -> CheckOutcome {
    let bound = strategy.time_bound();
    match tokio::time::timeout(bound, strategy.collect_state(observation)).await {
        Ok(Ok(evidence)) => {
            debug!(kind = %strategy.kind(), evidence = ?evidence, "collected evidence");
            strategy.compare_expected(&evidence)
        }
        Ok(Err(Unavailable(reason))) => CheckOutcome::Inconclusive { reason },
        Err(_) => CheckOutcome::inconclusive(format!(
            "evidence collection exceeded {}ms",
            bound.as_millis()
        )),
    }
}

// ─── 출력 마커 ──────────────────────────────────────────────────────

/// 드라이버 출력에 실패 마커가 있으면 위반
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMarker {
    pub marker: String,
}

impl InvariantStrategy for OutputMarker {
    /// 마커가 포함된 줄
    type Evidence = Option<String>;

    fn kind(&self) -> InvariantKind {
        InvariantKind::Safety
    }

    async fn collect_state(
        &self,
        observation: &TrialObservation,
    ) -> Result<Self::Evidence, Unavailable> {
        if let Some(line) = observation.find_marker(&self.marker) {
            return Ok(Some(line.to_owned()));
        }
        // 마커 없이 중간에 끊긴 출력은 통과 근거가 되지 못함
        if !observation.exited_normally() {
            return Err(Unavailable::new(
                "driver did not exit normally and printed no failure marker",
            ));
        }
        Ok(None)
    }

    fn compare_expected(&self, evidence: &Self::Evidence) -> CheckOutcome {
        match evidence {
            Some(line) => CheckOutcome::violation(format!(
                "driver output contains '{}': {line}",
                self.marker
            )),
            None => CheckOutcome::Pass,
        }
    }
}

// ─── 종료 코드 ──────────────────────────────────────────────────────

/// 드라이버 종료 코드가 0이 아니면 위반
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus;

impl InvariantStrategy for ExitStatus {
    type Evidence = i32;

    fn kind(&self) -> InvariantKind {
        InvariantKind::Safety
    }

    async fn collect_state(
        &self,
        observation: &TrialObservation,
    ) -> Result<Self::Evidence, Unavailable> {
        if observation.terminated_by_engine {
            return Err(Unavailable::new("driver was terminated by the engine"));
        }
        observation
            .exit_code
            .ok_or_else(|| Unavailable::new("driver has no exit code (killed by a signal)"))
    }

    fn compare_expected(&self, evidence: &Self::Evidence) -> CheckOutcome {
        if *evidence == 0 {
            CheckOutcome::Pass
        } else {
            CheckOutcome::violation(format!("driver exited with status {evidence}"))
        }
    }
}

// ─── 상수 비교 ──────────────────────────────────────────────────────

/// 보고된 변수가 기대 상수와 같아야 함
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantValue {
    pub variable: String,
    pub expected: String,
}

impl InvariantStrategy for ConstantValue {
    /// 보고된 값
    type Evidence = String;

    fn kind(&self) -> InvariantKind {
        InvariantKind::Durability
    }

    async fn collect_state(
        &self,
        observation: &TrialObservation,
    ) -> Result<Self::Evidence, Unavailable> {
        observation
            .state
            .get(&self.variable)
            .cloned()
            .ok_or_else(|| Unavailable::new(format!("'{}' was never reported", self.variable)))
    }

    fn compare_expected(&self, evidence: &Self::Evidence) -> CheckOutcome {
        if *evidence == self.expected {
            CheckOutcome::Pass
        } else {
            CheckOutcome::violation(format!(
                "{} = '{evidence}', expected '{}'",
                self.variable, self.expected
            ))
        }
    }
}

// ─── 변수 동등 ──────────────────────────────────────────────────────

/// 보고된 두 변수가 같아야 함
///
/// 변수 이름은 보고된 이름과 정확히 같거나, 경로 단위(`.`)로 앞부분이
/// 겹치거나, `nd.<변수>` 형태일 때 아무 노드의 같은 변수와 맞습니다.
/// 둘 다 보고되지 않았으면 어긋난 상태가 없으므로 통과입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equality {
    pub left: String,
    pub right: String,
}

/// 변수에 맞은 (보고된 이름, 값)
type Reported = Option<(String, String)>;

impl Equality {
    /// `wanted`에 맞는 보고 변수를 찾습니다. `taken`은 다른 쪽이 이미 쓴 이름입니다.
    fn lookup(
        state: &std::collections::BTreeMap<String, String>,
        wanted: &str,
        taken: Option<&str>,
    ) -> Reported {
        if let Some((key, value)) = state.get_key_value(wanted) {
            return Some((key.clone(), value.clone()));
        }
        state
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != taken)
            .find(|(key, _)| variable_matches(wanted, key))
            .map(|(key, value)| (key.clone(), value.clone()))
    }
}

/// 경로 접두어 또는 노드 무관 이름으로 맞는지
fn variable_matches(wanted: &str, reported: &str) -> bool {
    let path_prefix = |long: &str, short: &str| {
        long.strip_prefix(short)
            .is_some_and(|rest| rest.starts_with('.'))
    };
    if path_prefix(wanted, reported) || path_prefix(reported, wanted) {
        return true;
    }
    match (split_node_id(wanted), split_node_id(reported)) {
        (Some(("nd", variable)), Some((_, other))) => variable == other,
        _ => false,
    }
}

/// 노드 ID를 뗀 변수 이름
fn without_node_id(name: &str) -> &str {
    split_node_id(name).map_or(name, |(_, variable)| variable)
}

impl InvariantStrategy for Equality {
    type Evidence = (Reported, Reported);

    fn kind(&self) -> InvariantKind {
        InvariantKind::Durability
    }

    async fn collect_state(
        &self,
        observation: &TrialObservation,
    ) -> Result<Self::Evidence, Unavailable> {
        let left = Self::lookup(&observation.state, &self.left, None);
        let taken = left.as_ref().map(|(key, _)| key.as_str());
        let right = Self::lookup(&observation.state, &self.right, taken);
        Ok((left, right))
    }

    fn compare_expected(&self, evidence: &Self::Evidence) -> CheckOutcome {
        match evidence {
            (None, None) => CheckOutcome::Pass,
            (Some((lk, lv)), Some((rk, rv)))
                if lv == rv
                    && ((lk == &self.left && rk == &self.right)
                        || without_node_id(lk) == without_node_id(rk)) =>
            {
                CheckOutcome::Pass
            }
            (l, r) => CheckOutcome::violation(format!(
                "{} = {}, {} = {}",
                reported_name(l, &self.left),
                display_value(l.as_ref().map(|(_, v)| v.as_str())),
                reported_name(r, &self.right),
                display_value(r.as_ref().map(|(_, v)| v.as_str()))
            )),
        }
    }
}

fn reported_name<'a>(reported: &'a Reported, wanted: &'a str) -> &'a str {
    reported.as_ref().map_or(wanted, |(key, _)| key.as_str())
}

fn display_value(value: Option<&str>) -> String {
    value.map_or_else(|| "<unreported>".to_owned(), |v| format!("'{v}'"))
}

// ─── 도달 ───────────────────────────────────────────────────────────

/// 드라이버가 체크포인트에 도달해야 함
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaches {
    pub checkpoint: String,
}

impl InvariantStrategy for Reaches {
    /// 도달 여부
    type Evidence = bool;

    fn kind(&self) -> InvariantKind {
        InvariantKind::Liveness
    }

    async fn collect_state(
        &self,
        observation: &TrialObservation,
    ) -> Result<Self::Evidence, Unavailable> {
        if observation.first_position(&self.checkpoint).is_some() {
            return Ok(true);
        }
        if !observation.exited_normally() {
            return Err(Unavailable::new(format!(
                "driver stopped abnormally before checkpoint {}",
                self.checkpoint
            )));
        }
        Ok(false)
    }

    fn compare_expected(&self, evidence: &Self::Evidence) -> CheckOutcome {
        if *evidence {
            CheckOutcome::Pass
        } else {
            CheckOutcome::violation(format!(
                "driver exited without reaching checkpoint {}",
                self.checkpoint
            ))
        }
    }
}

// ─── 순서 ───────────────────────────────────────────────────────────

/// 체크포인트 `first`가 `second`보다 먼저 보고되어야 함
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordered {
    pub first: String,
    pub second: String,
}

impl InvariantStrategy for Ordered {
    /// 각 체크포인트가 처음 보고된 위치
    type Evidence = (usize, usize);

    fn kind(&self) -> InvariantKind {
        InvariantKind::Ordering
    }

    async fn collect_state(
        &self,
        observation: &TrialObservation,
    ) -> Result<Self::Evidence, Unavailable> {
        let position = |cp: &str| {
            observation
                .first_position(cp)
                .ok_or_else(|| Unavailable::new(format!("checkpoint {cp} was never reported")))
        };
        Ok((position(&self.first)?, position(&self.second)?))
    }

    fn compare_expected(&self, evidence: &Self::Evidence) -> CheckOutcome {
        let (first, second) = *evidence;
        if first < second {
            CheckOutcome::Pass
        } else {
            CheckOutcome::violation(format!(
                "checkpoint {} (report #{}) came after {} (report #{})",
                self.first,
                first + 1,
                self.second,
                second + 1
            ))
        }
    }
}

// ─── 상호 배제 ──────────────────────────────────────────────────────

/// `<node>.<variable>` 상태 중 `value`를 가진 노드가 최대 하나여야 함
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusive {
    pub variable: String,
    pub value: String,
}

impl InvariantStrategy for Exclusive {
    /// 값을 가진 노드 목록
    type Evidence = Vec<String>;

    fn kind(&self) -> InvariantKind {
        InvariantKind::MutualExclusion
    }

    async fn collect_state(
        &self,
        observation: &TrialObservation,
    ) -> Result<Self::Evidence, Unavailable> {
        let suffix = format!(".{}", self.variable);
        let mut reported = false;
        let mut holders = Vec::new();
        for (key, value) in &observation.state {
            let Some(node) = key.strip_suffix(&suffix) else {
                continue;
            };
            if node.is_empty() {
                continue;
            }
            reported = true;
            if *value == self.value {
                holders.push(node.to_owned());
            }
        }
        if !reported {
            return Err(Unavailable::new(format!(
                "no node reported '<node>{suffix}'"
            )));
        }
        Ok(holders)
    }

    fn compare_expected(&self, evidence: &Self::Evidence) -> CheckOutcome {
        if evidence.len() <= 1 {
            CheckOutcome::Pass
        } else {
            CheckOutcome::violation(format!(
                "{} nodes hold {} = '{}': {}",
                evidence.len(),
                self.variable,
                self.value,
                evidence.join(", ")
            ))
        }
    }
}

// ─── 외부 프로브 ────────────────────────────────────────────────────

/// 외부 명령의 종료 코드로 판정 (0 통과, 1 위반)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// `FAULTLINE_INVARIANT`로 전달할 불변식 이름
    pub invariant: String,
    pub command: String,
    pub timeout: Duration,
}

/// 프로브 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub code: i32,
    pub output: String,
}

impl InvariantStrategy for Probe {
    type Evidence = ProbeReport;

    fn kind(&self) -> InvariantKind {
        InvariantKind::Safety
    }

    async fn collect_state(
        &self,
        observation: &TrialObservation,
    ) -> Result<Self::Evidence, Unavailable> {
        debug!(command = %self.command, invariant = %self.invariant, "running probe");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("FAULTLINE_INVARIANT", &self.invariant)
            .env("FAULTLINE_TRIAL_ID", &observation.trial_id)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Unavailable::new(format!("failed to spawn probe: {e}")))?;

        let text = [output.stdout.as_slice(), output.stderr.as_slice()]
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect::<Vec<_>>()
            .join("");
        let lines: Vec<&str> = text.lines().collect();
        let tail = lines[lines.len().saturating_sub(PROBE_EVIDENCE_LINES)..].join("\n");

        match output.status.code() {
            Some(code @ (0 | 1)) => Ok(ProbeReport { code, output: tail }),
            Some(code) => Err(Unavailable::new(format!(
                "probe exited with status {code}: {tail}"
            ))),
            None => Err(Unavailable::new("probe was terminated by a signal")),
        }
    }

    fn compare_expected(&self, evidence: &Self::Evidence) -> CheckOutcome {
        if evidence.code == 0 {
            CheckOutcome::Pass
        } else if evidence.output.is_empty() {
            CheckOutcome::violation(format!("probe '{}' reported a violation", self.command))
        } else {
            CheckOutcome::violation(evidence.output.clone())
        }
    }

    fn time_bound(&self) -> Duration {
        self.timeout
    }
}

// ─── 해석 ───────────────────────────────────────────────────────────

/// 참조를 해석한 구체 전략
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedStrategy {
    OutputMarker(OutputMarker),
    ExitStatus(ExitStatus),
    Constant(ConstantValue),
    Equality(Equality),
    Reaches(Reaches),
    Ordered(Ordered),
    Exclusive(Exclusive),
    Probe(Probe),
}

impl ResolvedStrategy {
    /// 참조를 구체 전략으로 해석합니다.
    ///
    /// # Errors
    /// - `InvariantError::InvalidArgument`: 인자 개수나 형식이 맞지 않음
    /// - `InvariantError::Unresolved`: 명령 없는 `probe`에 등록된 프로브도 없음
    pub fn resolve(
        reference: &InvariantReference,
        config: &CheckerConfig,
    ) -> Result<Self, InvariantError> {
        let argument = reference.argument.trim();
        let resolved = match reference.strategy {
            StrategyToken::Default => match config.probes.get(&reference.name) {
                Some(command) => Self::probe(reference, command, config),
                None => Self::default_strategy(reference, config)?,
            },
            StrategyToken::OutputMarker => Self::OutputMarker(OutputMarker {
                marker: if argument.is_empty() {
                    config.failure_marker.clone()
                } else {
                    argument.to_owned()
                },
            }),
            StrategyToken::ExitStatus => {
                if !argument.is_empty() {
                    return Err(invalid(reference, "exit-status takes no argument"));
                }
                Self::ExitStatus(ExitStatus)
            }
            StrategyToken::Constant => {
                let (variable, expected) = variable_and_value(reference, "const")?;
                Self::Constant(ConstantValue { variable, expected })
            }
            StrategyToken::Equality => {
                let [left, right] = exact_args(reference, "equal", ["<var1>", "<var2>"])?;
                Self::Equality(Equality { left, right })
            }
            StrategyToken::Reaches => {
                let [checkpoint] = exact_args(reference, "reaches", ["<checkpoint>"])?;
                Self::Reaches(Reaches { checkpoint })
            }
            StrategyToken::Ordered => {
                let [first, second] = exact_args(reference, "ordered", ["<cp-a>", "<cp-b>"])?;
                Self::Ordered(Ordered { first, second })
            }
            StrategyToken::Exclusive => {
                let (variable, value) = variable_and_value(reference, "exclusive")?;
                Self::Exclusive(Exclusive { variable, value })
            }
            StrategyToken::Probe => {
                if argument.is_empty() {
                    let command = config
                        .probes
                        .get(&reference.name)
                        .ok_or_else(|| InvariantError::Unresolved(reference.name.clone()))?;
                    Self::probe(reference, command, config)
                } else {
                    Self::probe(reference, argument, config)
                }
            }
        };
        Ok(resolved)
    }

    fn default_strategy(
        reference: &InvariantReference,
        config: &CheckerConfig,
    ) -> Result<Self, InvariantError> {
        match config.default_strategy {
            StrategyToken::OutputMarker => Ok(Self::OutputMarker(OutputMarker {
                marker: config.failure_marker.clone(),
            })),
            StrategyToken::ExitStatus => Ok(Self::ExitStatus(ExitStatus)),
            _ => Err(InvariantError::Unresolved(reference.name.clone())),
        }
    }

    fn probe(reference: &InvariantReference, command: &str, config: &CheckerConfig) -> Self {
        Self::Probe(Probe {
            invariant: reference.name.clone(),
            command: command.to_owned(),
            timeout: config.probe_timeout,
        })
    }

    /// 메트릭 레이블용 전략 이름
    pub fn label(&self) -> &'static str {
        match self {
            Self::OutputMarker(_) => StrategyToken::OutputMarker.as_str(),
            Self::ExitStatus(_) => StrategyToken::ExitStatus.as_str(),
            Self::Constant(_) => StrategyToken::Constant.as_str(),
            Self::Equality(_) => StrategyToken::Equality.as_str(),
            Self::Reaches(_) => StrategyToken::Reaches.as_str(),
            Self::Ordered(_) => StrategyToken::Ordered.as_str(),
            Self::Exclusive(_) => StrategyToken::Exclusive.as_str(),
            Self::Probe(_) => StrategyToken::Probe.as_str(),
        }
    }

    pub fn kind(&self) -> InvariantKind {
        match self {
            Self::OutputMarker(s) => s.kind(),
            Self::ExitStatus(s) => s.kind(),
            Self::Constant(s) => s.kind(),
            Self::Equality(s) => s.kind(),
            Self::Reaches(s) => s.kind(),
            Self::Ordered(s) => s.kind(),
            Self::Exclusive(s) => s.kind(),
            Self::Probe(s) => s.kind(),
        }
    }

    pub fn time_bound(&self) -> Duration {
        match self {
            Self::OutputMarker(s) => s.time_bound(),
            Self::ExitStatus(s) => s.time_bound(),
            Self::Constant(s) => s.time_bound(),
            Self::Equality(s) => s.time_bound(),
            Self::Reaches(s) => s.time_bound(),
            Self::Ordered(s) => s.time_bound(),
            Self::Exclusive(s) => s.time_bound(),
            Self::Probe(s) => s.time_bound(),
        }
    }

    /// 드라이버 출력에서 감시해야 할 마커
    pub fn watched_marker(&self) -> Option<&str> {
        match self {
            Self::OutputMarker(s) => Some(&s.marker),
            _ => None,
        }
    }

    /// 구체 전략으로 판정합니다.
    pub async fn evaluate(&self, observation: &TrialObservation) -> CheckOutcome {
        match self {
            Self::OutputMarker(s) => evaluate(s, observation).await,
            Self::ExitStatus(s) => evaluate(s, observation).await,
            Self::Constant(s) => evaluate(s, observation).await,
            Self::Equality(s) => evaluate(s, observation).await,
            Self::Reaches(s) => evaluate(s, observation).await,
            Self::Ordered(s) => evaluate(s, observation).await,
            Self::Exclusive(s) => evaluate(s, observation).await,
            Self::Probe(s) => evaluate(s, observation).await,
        }
    }
}

fn invalid(reference: &InvariantReference, reason: impl Into<String>) -> InvariantError {
    InvariantError::InvalidArgument {
        invariant: reference.name.clone(),
        reason: reason.into(),
    }
}

/// 인자를 정확히 `N`개로 나눕니다.
fn exact_args<const N: usize>(
    reference: &InvariantReference,
    strategy: &str,
    usage: [&str; N],
) -> Result<[String; N], InvariantError> {
    let args = reference.args();
    if args.len() != N {
        return Err(invalid(
            reference,
            format!(
                "{strategy} expects {} (got {} argument(s))",
                usage.join(" "),
                args.len()
            ),
        ));
    }
    Ok(std::array::from_fn(|i| args[i].to_owned()))
}

/// `<변수> <값...>` 형태를 나눕니다. 값에는 공백이 들어갈 수 있습니다.
fn variable_and_value(
    reference: &InvariantReference,
    strategy: &str,
) -> Result<(String, String), InvariantError> {
    reference
        .argument
        .trim()
        .split_once(char::is_whitespace)
        .map(|(var, value)| (var.to_owned(), value.trim().to_owned()))
        .filter(|(_, value)| !value.is_empty())
        .ok_or_else(|| invalid(reference, format!("{strategy} expects <variable> <value>")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::types::CheckpointId;

    fn reference(text: &str) -> InvariantReference {
        InvariantReference::parse(text).unwrap()
    }

    fn resolve(text: &str) -> Result<ResolvedStrategy, InvariantError> {
        ResolvedStrategy::resolve(&reference(text), &CheckerConfig::default())
    }

    fn exited(code: i32) -> TrialObservation {
        TrialObservation {
            exit_code: Some(code),
            ..Default::default()
        }
    }

    fn with_state(pairs: &[(&str, &str)]) -> TrialObservation {
        TrialObservation {
            state: pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            ..exited(0)
        }
    }

    fn with_checkpoints(cps: &[&str]) -> TrialObservation {
        TrialObservation {
            checkpoints_seen: cps.iter().map(|c| CheckpointId::from(*c)).collect(),
            ..exited(0)
        }
    }

    #[test]
    fn bare_name_resolves_to_default_marker() {
        let strategy = resolve("no-data-loss").unwrap();
        assert_eq!(
            strategy,
            ResolvedStrategy::OutputMarker(OutputMarker {
                marker: "test has failed".to_owned()
            })
        );
        assert_eq!(strategy.watched_marker(), Some("test has failed"));
    }

    #[test]
    fn bare_name_prefers_configured_probe() {
        let config = CheckerConfig::default().with_probe("no-data-loss", "./check.sh");
        let strategy =
            ResolvedStrategy::resolve(&reference("no-data-loss"), &config).unwrap();
        assert!(matches!(strategy, ResolvedStrategy::Probe(ref p) if p.command == "./check.sh"));
        assert_eq!(strategy.label(), "probe");
    }

    #[test]
    fn comparison_forms_resolve() {
        assert_eq!(
            resolve("Gossiper.live == nd.Gossiper.live").unwrap(),
            ResolvedStrategy::Equality(Equality {
                left: "Gossiper.live".to_owned(),
                right: "nd.Gossiper.live".to_owned(),
            })
        );
        assert_eq!(
            resolve("rows == \"100\"").unwrap(),
            ResolvedStrategy::Constant(ConstantValue {
                variable: "rows".to_owned(),
                expected: "100".to_owned(),
            })
        );
    }

    #[test]
    fn argument_errors_are_reported() {
        assert!(matches!(
            resolve("x: ordered 1"),
            Err(InvariantError::InvalidArgument { .. })
        ));
        assert!(matches!(
            resolve("x: const rows"),
            Err(InvariantError::InvalidArgument { .. })
        ));
        assert!(matches!(
            resolve("x: exit-status 3"),
            Err(InvariantError::InvalidArgument { .. })
        ));
        assert!(matches!(
            resolve("x: probe"),
            Err(InvariantError::Unresolved(_))
        ));
    }

    #[test]
    fn strategy_kinds() {
        assert_eq!(resolve("x: ordered 1 2").unwrap().kind(), InvariantKind::Ordering);
        assert_eq!(resolve("x: reaches 2").unwrap().kind(), InvariantKind::Liveness);
        assert_eq!(
            resolve("x: exclusive role leader").unwrap().kind(),
            InvariantKind::MutualExclusion
        );
        assert_eq!(resolve("x: const a 1").unwrap().kind(), InvariantKind::Durability);
    }

    #[tokio::test]
    async fn output_marker_outcomes() {
        let strategy = OutputMarker {
            marker: "test has failed".to_owned(),
        };
        let clean = exited(0);
        assert_eq!(evaluate(&strategy, &clean).await, CheckOutcome::Pass);

        let failed = TrialObservation {
            output_tail: vec!["assert: test has failed (rows=99)".to_owned()],
            ..exited(0)
        };
        assert!(matches!(
            evaluate(&strategy, &failed).await,
            CheckOutcome::Violation { .. }
        ));

        let killed = TrialObservation {
            signaled: true,
            ..Default::default()
        };
        assert!(matches!(
            evaluate(&strategy, &killed).await,
            CheckOutcome::Inconclusive { .. }
        ));
    }

    #[tokio::test]
    async fn exit_status_outcomes() {
        assert_eq!(evaluate(&ExitStatus, &exited(0)).await, CheckOutcome::Pass);
        assert!(matches!(
            evaluate(&ExitStatus, &exited(2)).await,
            CheckOutcome::Violation { .. }
        ));
        assert!(matches!(
            evaluate(&ExitStatus, &TrialObservation::default()).await,
            CheckOutcome::Inconclusive { .. }
        ));
    }

    #[tokio::test]
    async fn constant_outcomes() {
        let strategy = ConstantValue {
            variable: "rows".to_owned(),
            expected: "100".to_owned(),
        };
        assert_eq!(
            evaluate(&strategy, &with_state(&[("rows", "100")])).await,
            CheckOutcome::Pass
        );
        assert_eq!(
            evaluate(&strategy, &with_state(&[("rows", "99")])).await,
            CheckOutcome::violation("rows = '99', expected '100'")
        );
        assert!(matches!(
            evaluate(&strategy, &with_state(&[])).await,
            CheckOutcome::Inconclusive { .. }
        ));
    }

    #[tokio::test]
    async fn equality_outcomes() {
        let strategy = Equality {
            left: "a".to_owned(),
            right: "b".to_owned(),
        };
        assert_eq!(
            evaluate(&strategy, &with_state(&[("a", "1"), ("b", "1")])).await,
            CheckOutcome::Pass
        );
        assert_eq!(
            evaluate(&strategy, &with_state(&[("a", "1")])).await,
            CheckOutcome::violation("a = '1', b = <unreported>")
        );
        assert_eq!(
            evaluate(&strategy, &with_state(&[("a", "1"), ("b", "2")])).await,
            CheckOutcome::violation("a = '1', b = '2'")
        );
        // 둘 다 없으면 어긋난 값도 없음
        assert_eq!(
            evaluate(&strategy, &with_state(&[("c", "1")])).await,
            CheckOutcome::Pass
        );
    }

    #[tokio::test]
    async fn equality_matches_any_node_for_nd_dot_variable() {
        let strategy = Equality {
            left: "nd1-Gossiper.live".to_owned(),
            right: "nd.Gossiper.live".to_owned(),
        };
        assert_eq!(
            evaluate(
                &strategy,
                &with_state(&[("nd1-Gossiper.live", "3"), ("nd2-Gossiper.live", "3")])
            )
            .await,
            CheckOutcome::Pass
        );
        assert_eq!(
            evaluate(
                &strategy,
                &with_state(&[("nd1-Gossiper.live", "3"), ("nd2-Gossiper.live", "2")])
            )
            .await,
            CheckOutcome::violation("nd1-Gossiper.live = '3', nd2-Gossiper.live = '2'")
        );
        // 한쪽 노드만 보고하면 위반
        assert!(matches!(
            evaluate(&strategy, &with_state(&[("nd1-Gossiper.live", "3")])).await,
            CheckOutcome::Violation { .. }
        ));
    }

    #[tokio::test]
    async fn equality_matches_reported_path_prefix() {
        let strategy = Equality {
            left: "nd1-Table.rows.count".to_owned(),
            right: "nd2-Table.rows.count".to_owned(),
        };
        // 드라이버가 상위 경로만 보고
        assert_eq!(
            evaluate(
                &strategy,
                &with_state(&[("nd1-Table.rows", "7"), ("nd2-Table.rows", "7")])
            )
            .await,
            CheckOutcome::Pass
        );
        // 경로 경계가 아닌 접두어는 다른 변수라 둘 다 보고되지 않은 셈
        assert_eq!(
            evaluate(
                &strategy,
                &with_state(&[("nd1-Table.row", "7"), ("nd2-Table.row", "7")])
            )
            .await,
            CheckOutcome::Pass
        );
        assert!(matches!(
            evaluate(
                &strategy,
                &with_state(&[("nd1-Table.rows", "7"), ("nd2-Other.rows", "7")])
            )
            .await,
            CheckOutcome::Violation { .. }
        ));
    }

    #[tokio::test]
    async fn reaches_outcomes() {
        let strategy = Reaches {
            checkpoint: "3".to_owned(),
        };
        assert_eq!(
            evaluate(&strategy, &with_checkpoints(&["1", "3"])).await,
            CheckOutcome::Pass
        );
        assert!(matches!(
            evaluate(&strategy, &with_checkpoints(&["1"])).await,
            CheckOutcome::Violation { .. }
        ));
        let crashed = TrialObservation {
            terminated_by_engine: true,
            ..with_checkpoints(&["1"])
        };
        assert!(matches!(
            evaluate(&strategy, &crashed).await,
            CheckOutcome::Inconclusive { .. }
        ));
    }

    #[tokio::test]
    async fn ordered_outcomes() {
        let strategy = Ordered {
            first: "prepare".to_owned(),
            second: "commit".to_owned(),
        };
        assert_eq!(
            evaluate(&strategy, &with_checkpoints(&["prepare", "commit"])).await,
            CheckOutcome::Pass
        );
        assert!(matches!(
            evaluate(&strategy, &with_checkpoints(&["commit", "prepare"])).await,
            CheckOutcome::Violation { .. }
        ));
        assert!(matches!(
            evaluate(&strategy, &with_checkpoints(&["prepare"])).await,
            CheckOutcome::Inconclusive { .. }
        ));
    }

    #[tokio::test]
    async fn exclusive_outcomes() {
        let strategy = Exclusive {
            variable: "role".to_owned(),
            value: "leader".to_owned(),
        };
        let one = with_state(&[("n1.role", "leader"), ("n2.role", "follower")]);
        assert_eq!(evaluate(&strategy, &one).await, CheckOutcome::Pass);

        let split_brain = with_state(&[("n1.role", "leader"), ("n2.role", "leader")]);
        assert_eq!(
            evaluate(&strategy, &split_brain).await,
            CheckOutcome::violation("2 nodes hold role = 'leader': n1, n2")
        );

        let nothing = with_state(&[("role", "leader")]);
        assert!(matches!(
            evaluate(&strategy, &nothing).await,
            CheckOutcome::Inconclusive { .. }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_exit_codes_map_to_outcomes() {
        let probe = |command: &str| Probe {
            invariant: "no-data-loss".to_owned(),
            command: command.to_owned(),
            timeout: Duration::from_secs(5),
        };
        let obs = TrialObservation::default();
        assert_eq!(evaluate(&probe("exit 0"), &obs).await, CheckOutcome::Pass);
        assert_eq!(
            evaluate(&probe("echo \"lost rows in $FAULTLINE_INVARIANT\"; exit 1"), &obs).await,
            CheckOutcome::violation("lost rows in no-data-loss")
        );
        assert!(matches!(
            evaluate(&probe("exit 7"), &obs).await,
            CheckOutcome::Inconclusive { .. }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_probe_is_inconclusive() {
        let probe = Probe {
            invariant: "slow".to_owned(),
            command: "sleep 5".to_owned(),
            timeout: Duration::from_millis(100),
        };
        let outcome = evaluate(&probe, &TrialObservation::default()).await;
        assert!(matches!(outcome, CheckOutcome::Inconclusive { ref reason } if reason.contains("exceeded")));
    }
}
