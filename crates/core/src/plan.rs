//! 실패 계획 저장소 -- 계획 파일과 불변식 목록 로딩
//!
//! # 계획 파일 형식
//!
//! ```text
//! faultline-plan leader-crash seed=42          # 1행: 헤더 (+ key=value 메타데이터)
//! no-data-loss: const rows 100                 # 2행: 불변식 참조
//! 2 | leader   | kill                          # 3행~: 체크포인트 | 대상 | 액션 [| 인자]
//! 3 | follower | delay | 250ms
//! 3 | follower | partition | leader,witness
//! 5 | leader   | corrupt | flip:data/commitlog:128
//!
//! 이벤트 뒤 첫 빈 줄 이후는 자유 형식 메모 (기록된 드라이버 출력 등)
//! ```
//!
//! `#`로 시작하는 줄은 주석입니다. 로딩은 파일을 변경하지 않으므로
//! 같은 파일을 두 번 로딩하면 같은 값이 나옵니다.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PlanError;
use crate::invariant::InvariantReference;
use crate::types::{CheckpointId, CorruptSpec, FaultAction, FaultEvent};

/// 계획 헤더 첫 토큰
pub const PLAN_HEADER: &str = "faultline-plan";

/// 계획 / 불변식 목록 파일 크기 상한
const MAX_PLAN_FILE_SIZE: u64 = 1024 * 1024; // 1MB

/// 계획당 최대 이벤트 수
const MAX_EVENTS: usize = 10_000;

/// 실패 계획
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePlan {
    /// 계획 ID
    pub id: String,
    /// 검사할 불변식
    pub invariant: InvariantReference,
    /// 선언 순서대로의 장애 이벤트
    pub events: Vec<FaultEvent>,
    /// 헤더의 key=value 메타데이터
    pub metadata: BTreeMap<String, String>,
}

impl FailurePlan {
    /// 파일에서 계획을 로드합니다.
    ///
    /// # Errors
    /// - 파일을 읽을 수 없거나 1MB를 넘는 경우
    /// - 형식 오류 ([`PlanError`] 참조)
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let content = read_bounded(path).await?;
        let plan = Self::parse(&content)?;
        info!(
            path = %path.display(),
            plan_id = %plan.id,
            invariant = %plan.invariant,
            events = plan.events.len(),
            "loaded failure plan"
        );
        Ok(plan)
    }

    /// 계획 텍스트를 파싱합니다.
    pub fn parse(text: &str) -> Result<Self, PlanError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()));

        // 헤더: 첫 번째 의미 있는 줄
        let (header_line, header) = lines
            .by_ref()
            .find(|(_, l)| !is_skippable(l))
            .ok_or(PlanError::MissingHeader)?;
        let (id, metadata) = parse_header(header_line, header)?;

        let (_, invariant_text) = lines
            .by_ref()
            .find(|(_, l)| !is_skippable(l))
            .ok_or(PlanError::MissingInvariant)?;
        let invariant = InvariantReference::parse(invariant_text)?;

        let mut events = Vec::new();
        let mut event_lines = Vec::new();
        let mut seen = HashSet::new();

        for (line_no, line) in lines {
            if line.is_empty() {
                if events.is_empty() {
                    continue;
                }
                // 이벤트 구역 종료, 나머지는 메모
                break;
            }
            if line.starts_with('#') {
                continue;
            }

            let event = parse_event(line_no, line)?;
            if !seen.insert((event.checkpoint.clone(), event.target.clone())) {
                return Err(PlanError::DuplicateCheckpointTarget {
                    line: line_no,
                    checkpoint: event.checkpoint.to_string(),
                    target: event.target,
                });
            }
            events.push(event);
            event_lines.push(line_no);

            if events.len() > MAX_EVENTS {
                return Err(PlanError::InvalidEvent {
                    line: line_no,
                    reason: format!("too many events: max {MAX_EVENTS}"),
                });
            }
        }

        if events.is_empty() {
            return Err(PlanError::NoEvents);
        }
        check_order(&events, &event_lines)?;

        debug!(plan_id = %id, events = events.len(), "parsed failure plan");
        Ok(Self {
            id,
            invariant,
            events,
            metadata,
        })
    }

    /// 불변식만 바꾼 복사본을 만듭니다 (캠페인 모드에서 사용).
    pub fn with_invariant(&self, invariant: InvariantReference) -> Self {
        Self {
            invariant,
            ..self.clone()
        }
    }

    /// 계획에 등장하는 체크포인트 (선언 순서, 중복 제거)
    pub fn checkpoints(&self) -> Vec<&CheckpointId> {
        let mut seen = HashSet::new();
        self.events
            .iter()
            .map(|e| &e.checkpoint)
            .filter(|cp| seen.insert(*cp))
            .collect()
    }

    /// 계획을 다시 파일 형식으로 렌더링합니다.
    pub fn to_plan_text(&self) -> String {
        let mut out = String::from(PLAN_HEADER);
        out.push(' ');
        out.push_str(&self.id);
        for (k, v) in &self.metadata {
            out.push_str(&format!(" {k}={v}"));
        }
        out.push('\n');
        out.push_str(&self.invariant.to_reference_text());
        out.push('\n');
        for event in &self.events {
            out.push_str(&format!(
                "{} | {} | {}\n",
                event.checkpoint,
                event.target,
                event.action.to_plan_fields()
            ));
        }
        out
    }
}

/// 불변식 목록 파일을 로드합니다.
///
/// 한 줄에 하나의 참조를 두며, 빈 줄과 `#` 주석은 무시합니다.
pub async fn load_invariant_list(
    path: impl AsRef<Path>,
) -> Result<Vec<InvariantReference>, PlanError> {
    let path = path.as_ref();
    let content = read_bounded(path).await?;
    let list = parse_invariant_list(&content, &path.display().to_string())?;
    info!(path = %path.display(), count = list.len(), "loaded invariant list");
    Ok(list)
}

/// 불변식 목록 텍스트를 파싱합니다. `origin`은 에러 메시지용입니다.
pub fn parse_invariant_list(
    text: &str,
    origin: &str,
) -> Result<Vec<InvariantReference>, PlanError> {
    let list = text
        .lines()
        .map(str::trim)
        .filter(|l| !is_skippable(l))
        .map(InvariantReference::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if list.is_empty() {
        return Err(PlanError::NoInvariants {
            path: origin.to_owned(),
        });
    }
    Ok(list)
}

async fn read_bounded(path: &Path) -> Result<String, PlanError> {
    let io_err = |source| PlanError::Io {
        path: path.display().to_string(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(io_err)?;
    if metadata.len() > MAX_PLAN_FILE_SIZE {
        return Err(PlanError::TooLarge {
            size: usize::try_from(metadata.len()).unwrap_or(usize::MAX),
            max: MAX_PLAN_FILE_SIZE as usize,
        });
    }
    tokio::fs::read_to_string(path).await.map_err(io_err)
}

fn is_skippable(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

fn parse_header(
    line_no: usize,
    header: &str,
) -> Result<(String, BTreeMap<String, String>), PlanError> {
    let mut tokens = header.split_whitespace();
    if tokens.next() != Some(PLAN_HEADER) {
        return Err(PlanError::MissingHeader);
    }
    let id = tokens.next().ok_or(PlanError::MissingHeader)?.to_owned();

    let mut metadata = BTreeMap::new();
    for token in tokens {
        let (k, v) = token.split_once('=').ok_or_else(|| PlanError::InvalidEvent {
            line: line_no,
            reason: format!("header metadata '{token}' must be key=value"),
        })?;
        metadata.insert(k.to_owned(), v.to_owned());
    }
    Ok((id, metadata))
}

fn parse_event(line_no: usize, line: &str) -> Result<FaultEvent, PlanError> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() < 3 || fields.len() > 4 {
        return Err(PlanError::InvalidEvent {
            line: line_no,
            reason: "expected '<checkpoint> | <target> | <action> [| <params>]'".to_owned(),
        });
    }

    let checkpoint = fields[0];
    let target = fields[1];
    if checkpoint.is_empty() || checkpoint.contains(char::is_whitespace) {
        return Err(PlanError::InvalidEvent {
            line: line_no,
            reason: format!("invalid checkpoint id '{checkpoint}'"),
        });
    }
    if target.is_empty() {
        return Err(PlanError::InvalidEvent {
            line: line_no,
            reason: "empty target".to_owned(),
        });
    }

    let action_name = fields[2].to_ascii_lowercase();
    let param = fields.get(3).copied().filter(|p| !p.is_empty());
    let invalid = |reason: String| PlanError::InvalidEvent {
        line: line_no,
        reason,
    };

    let action = match (action_name.as_str(), param) {
        ("kill", None) => FaultAction::Kill,
        ("pause", None) => FaultAction::Pause,
        ("resume", None) => FaultAction::Resume,
        ("kill" | "pause" | "resume", Some(p)) => {
            return Err(invalid(format!("'{action_name}' takes no parameter, got '{p}'")));
        }
        ("delay", Some(p)) => {
            let duration = humantime::parse_duration(p)
                .map_err(|e| invalid(format!("invalid delay '{p}': {e}")))?;
            FaultAction::Delay { duration }
        }
        ("partition", Some(p)) => {
            let peers: std::collections::BTreeSet<String> = p
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            if peers.is_empty() {
                return Err(invalid("partition needs at least one peer".to_owned()));
            }
            if peers.contains(target) {
                return Err(invalid(format!("'{target}' cannot be partitioned from itself")));
            }
            FaultAction::Partition { peers }
        }
        ("corrupt", Some(p)) => FaultAction::Corrupt {
            spec: CorruptSpec::parse(p).map_err(invalid)?,
        },
        ("delay" | "partition" | "corrupt", None) => {
            return Err(invalid(format!("'{action_name}' requires a parameter")));
        }
        (other, _) => {
            return Err(PlanError::UnknownAction {
                line: line_no,
                action: other.to_owned(),
            });
        }
    };

    Ok(FaultEvent {
        checkpoint: CheckpointId::new(checkpoint),
        target: target.to_owned(),
        action,
    })
}

/// 모든 체크포인트가 정수일 때 감소하지 않는지 검사합니다.
fn check_order(events: &[FaultEvent], lines: &[usize]) -> Result<(), PlanError> {
    let numbers: Option<Vec<u64>> = events.iter().map(|e| e.checkpoint.as_number()).collect();
    let Some(numbers) = numbers else {
        return Ok(());
    };
    for (i, pair) in numbers.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(PlanError::OutOfOrder { line: lines[i + 1] });
        }
    }
    Ok(())
}
