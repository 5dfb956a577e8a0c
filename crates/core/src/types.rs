//! 도메인 타입 -- 체크포인트, 장애 액션, 장애 이벤트
//!
//! 실패 계획과 주입기, 트라이얼 러너가 공유하는 데이터 구조를 정의합니다.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 체크포인트 식별자
///
/// SUT가 계측 채널로 보고하는 불투명한 문자열입니다.
/// 모든 체크포인트가 정수일 때에만 순서 검사에 쓰입니다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    /// 새 체크포인트 식별자를 생성합니다.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 원본 문자열
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 정수 체크포인트라면 그 값을 반환합니다.
    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckpointId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// 파일 손상 방식
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorruptSpec {
    /// 파일을 `len` 바이트로 자름
    Truncate { path: PathBuf, len: u64 },
    /// `offset`부터 `count` 바이트의 비트를 반전
    FlipBytes {
        path: PathBuf,
        offset: u64,
        count: u64,
    },
    /// `offset`부터 `len` 바이트를 0으로 덮어씀
    Zero { path: PathBuf, offset: u64, len: u64 },
}

impl CorruptSpec {
    /// 손상 대상 파일 경로
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Truncate { path, .. } | Self::FlipBytes { path, .. } | Self::Zero { path, .. } => {
                path
            }
        }
    }

    /// `truncate:<path>:<len>`, `flip:<path>:<offset>[:<count>]`,
    /// `zero:<path>:<offset>:<len>` 형식을 파싱합니다.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("corrupt spec '{s}' has no kind prefix"))?;

        match kind.trim() {
            "truncate" => {
                let (path, len) = split_tail(rest, 1)?;
                Ok(Self::Truncate {
                    path: path.into(),
                    len: len[0],
                })
            }
            "flip" => {
                // 끝의 두 필드가 모두 숫자면 count까지 지정된 형태
                if let Ok((path, nums)) = split_tail(rest, 2) {
                    if !path.is_empty() {
                        return Ok(Self::FlipBytes {
                            path: path.into(),
                            offset: nums[0],
                            count: nums[1],
                        });
                    }
                }
                let (path, nums) = split_tail(rest, 1)?;
                Ok(Self::FlipBytes {
                    path: path.into(),
                    offset: nums[0],
                    count: 1,
                })
            }
            "zero" => {
                let (path, nums) = split_tail(rest, 2)?;
                Ok(Self::Zero {
                    path: path.into(),
                    offset: nums[0],
                    len: nums[1],
                })
            }
            other => Err(format!("unknown corrupt kind '{other}'")),
        }
    }
}

/// `path:n1:n2...`에서 뒤쪽 `count`개의 숫자 필드를 떼어냅니다.
fn split_tail(s: &str, count: usize) -> Result<(String, Vec<u64>), String> {
    let mut parts: Vec<&str> = s.rsplitn(count + 1, ':').collect();
    if parts.len() != count + 1 {
        return Err(format!("corrupt spec '{s}' needs {count} numeric field(s)"));
    }
    let path = parts.pop().unwrap_or_default().trim().to_owned();
    if path.is_empty() {
        return Err("corrupt spec has an empty path".to_owned());
    }
    let mut nums = Vec::with_capacity(count);
    for raw in parts.into_iter().rev() {
        let n = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("'{raw}' is not a non-negative integer"))?;
        nums.push(n);
    }
    Ok((path, nums))
}

impl fmt::Display for CorruptSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncate { path, len } => write!(f, "truncate:{}:{len}", path.display()),
            Self::FlipBytes {
                path,
                offset,
                count,
            } => write!(f, "flip:{}:{offset}:{count}", path.display()),
            Self::Zero { path, offset, len } => {
                write!(f, "zero:{}:{offset}:{len}", path.display())
            }
        }
    }
}

/// 장애 액션
///
/// 닫힌 집합이며, 모든 처리 지점은 exhaustive match로 다룹니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FaultAction {
    /// SIGKILL로 대상 종료 (되돌릴 수 없음)
    Kill,
    /// 대상 일시정지
    Pause,
    /// 일시정지된 대상 재개
    Resume,
    /// 체크포인트 해제를 지정 시간만큼 지연
    Delay {
        #[serde(with = "duration_ms")]
        duration: Duration,
    },
    /// 대상과 피어 사이의 네트워크 차단
    Partition { peers: BTreeSet<String> },
    /// 대상의 데이터 파일 손상
    Corrupt { spec: CorruptSpec },
}

impl FaultAction {
    /// 메트릭 태그용 고정된 액션 타입명을 반환합니다.
    ///
    /// `Display` 구현과 달리 가변 데이터(피어 목록, 경로 등)를 포함하지 않습니다.
    pub fn action_type_name(&self) -> &'static str {
        match self {
            Self::Kill => "kill",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Delay { .. } => "delay",
            Self::Partition { .. } => "partition",
            Self::Corrupt { .. } => "corrupt",
        }
    }

    /// 티어다운 시 되돌릴 수 있는 장애인지 여부
    pub fn is_reversible(&self) -> bool {
        !matches!(self, Self::Kill)
    }

    /// 계획 파일의 액션 필드(`kill`, `delay | 250ms` 등)로 렌더링합니다.
    pub fn to_plan_fields(&self) -> String {
        match self {
            Self::Kill | Self::Pause | Self::Resume => self.action_type_name().to_owned(),
            Self::Delay { duration } => {
                format!("delay | {}", humantime::format_duration(*duration))
            }
            Self::Partition { peers } => {
                let peers: Vec<&str> = peers.iter().map(String::as_str).collect();
                format!("partition | {}", peers.join(","))
            }
            Self::Corrupt { spec } => format!("corrupt | {spec}"),
        }
    }
}

impl fmt::Display for FaultAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kill | Self::Pause | Self::Resume => f.write_str(self.action_type_name()),
            Self::Delay { duration } => {
                write!(f, "delay({})", humantime::format_duration(*duration))
            }
            Self::Partition { peers } => {
                let peers: Vec<&str> = peers.iter().map(String::as_str).collect();
                write!(f, "partition({})", peers.join(","))
            }
            Self::Corrupt { spec } => write!(f, "corrupt({spec})"),
        }
    }
}

/// 장애 이벤트 -- 특정 체크포인트에서 특정 대상에 가할 액션
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    /// 트리거 체크포인트
    pub checkpoint: CheckpointId,
    /// 대상 이름 (노드/프로세스)
    pub target: String,
    /// 수행할 액션
    pub action: FaultAction,
}

impl fmt::Display for FaultEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.action, self.checkpoint, self.target)
    }
}

/// 캠페인 단계
///
/// 선택 단계에서는 어떤 장애도 주입하지 않고 도달 가능한 체크포인트만 기록합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 장애 없이 실행하여 체크포인트 수집
    Selection,
    /// 계획대로 장애 주입
    #[default]
    Injection,
}

impl Stage {
    /// 단계 파일 / 드라이버 환경변수에 쓰이는 표기
    pub fn as_signal(&self) -> &'static str {
        match self {
            Self::Selection => "SELECTION",
            Self::Injection => "INJECTION",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_signal())
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
