//! 불변식 참조 -- 이름과 검사 전략 토큰
//!
//! 참조는 세 가지 형태를 받습니다.
//!
//! | 형태 | 예시 | 해석 |
//! |------|------|------|
//! | 명시적 전략 | `no-data-loss: const rows 100` | 토큰 + 인자 |
//! | 비교식 | `Gossiper.live == nd.Gossiper.live` | 우변이 노드 범위 변수면 `equal`, 아니면 `const` |
//! | 이름만 | `no-data-loss` | 검사 시점에 프로브/기본 전략으로 해석 |
//!
//! 전략 토큰은 파싱 시점에 검증하고, 인자는 검사 시점에 해석합니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// 노드 범위 변수 이름을 (노드 ID, 변수 이름)으로 나눕니다.
///
/// - `nd.<변수>`: 아무 노드의 변수 (노드 ID는 `nd`)
/// - `nd<번호>-<변수>`, `nd-<번호>-<변수>`: 특정 노드의 변수
///
/// 그 밖의 이름(`node_count`, `ndx` 등)은 노드 범위가 아닙니다.
pub fn split_node_id(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("nd")?;
    if let Some(variable) = rest.strip_prefix('.') {
        return (!variable.is_empty()).then_some(("nd", variable));
    }

    let digits = rest.strip_prefix('-').unwrap_or(rest);
    let id_end = digits.find(|c: char| !c.is_ascii_digit())?;
    if id_end == 0 {
        return None;
    }
    let variable = digits[id_end..].strip_prefix('-')?;
    if variable.is_empty() {
        return None;
    }
    Some((&name[..name.len() - variable.len() - 1], variable))
}

/// 불변식 검사 전략 토큰
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyToken {
    /// 설정된 프로브 또는 기본 전략으로 해석
    Default,
    /// 드라이버 출력의 실패 마커 검사
    OutputMarker,
    /// 드라이버 종료 코드 검사
    ExitStatus,
    /// 보고된 변수가 상수와 같은지 검사
    Constant,
    /// 보고된 두 변수가 같은지 검사
    Equality,
    /// 체크포인트 도달 여부 검사
    Reaches,
    /// 두 체크포인트의 순서 검사
    Ordered,
    /// 한 값을 가진 노드가 최대 하나인지 검사
    Exclusive,
    /// 외부 명령으로 검사
    Probe,
}

impl StrategyToken {
    /// 참조 문법에서 쓰이는 토큰 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::OutputMarker => "output-marker",
            Self::ExitStatus => "exit-status",
            Self::Constant => "const",
            Self::Equality => "equal",
            Self::Reaches => "reaches",
            Self::Ordered => "ordered",
            Self::Exclusive => "exclusive",
            Self::Probe => "probe",
        }
    }
}

impl FromStr for StrategyToken {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "output-marker" | "marker" => Ok(Self::OutputMarker),
            "exit-status" | "exit" => Ok(Self::ExitStatus),
            "const" | "constant" => Ok(Self::Constant),
            "equal" | "equality" => Ok(Self::Equality),
            "reaches" => Ok(Self::Reaches),
            "ordered" => Ok(Self::Ordered),
            "exclusive" => Ok(Self::Exclusive),
            "probe" => Ok(Self::Probe),
            _ => Err(PlanError::UnknownStrategy(s.to_owned())),
        }
    }
}

impl fmt::Display for StrategyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 불변식 참조
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvariantReference {
    /// 불변식 이름 (결과 태깅에 사용)
    pub name: String,
    /// 검사 전략
    pub strategy: StrategyToken,
    /// 전략 인자 (공백으로 구분된 원문)
    pub argument: String,
}

impl InvariantReference {
    /// 전략을 기본값으로 두는 이름만의 참조를 생성합니다.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: StrategyToken::Default,
            argument: String::new(),
        }
    }

    /// 참조 문자열을 파싱합니다.
    pub fn parse(text: &str) -> Result<Self, PlanError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PlanError::InvalidInvariant {
                reference: text.to_owned(),
                reason: "empty reference".to_owned(),
            });
        }

        // 비교식 형태가 먼저: 식 안의 ':'을 전략 구분자로 오인하지 않도록
        if let Some((lhs, rhs)) = text.split_once("==") {
            return Self::parse_comparison(text, lhs.trim(), rhs.trim());
        }

        if let Some((name, rest)) = text.split_once(':') {
            let name = name.trim();
            let rest = rest.trim();
            if name.is_empty() {
                return Err(PlanError::InvalidInvariant {
                    reference: text.to_owned(),
                    reason: "missing invariant name before ':'".to_owned(),
                });
            }
            let (token, argument) = match rest.split_once(char::is_whitespace) {
                Some((token, arg)) => (token, arg.trim()),
                None => (rest, ""),
            };
            if token.is_empty() {
                return Err(PlanError::InvalidInvariant {
                    reference: text.to_owned(),
                    reason: "missing strategy after ':'".to_owned(),
                });
            }
            return Ok(Self {
                name: name.to_owned(),
                strategy: token.parse()?,
                argument: argument.to_owned(),
            });
        }

        if text.split_whitespace().count() > 1 {
            return Err(PlanError::InvalidInvariant {
                reference: text.to_owned(),
                reason: "bare invariant names must be a single word".to_owned(),
            });
        }
        Ok(Self::named(text))
    }

    fn parse_comparison(text: &str, lhs: &str, rhs: &str) -> Result<Self, PlanError> {
        if lhs.is_empty() || rhs.is_empty() || lhs.contains(char::is_whitespace) {
            return Err(PlanError::InvalidInvariant {
                reference: text.to_owned(),
                reason: "comparison needs '<variable> == <value>'".to_owned(),
            });
        }

        if split_node_id(rhs).is_some() {
            return Ok(Self {
                name: text.to_owned(),
                strategy: StrategyToken::Equality,
                argument: format!("{lhs} {rhs}"),
            });
        }

        let constant = rhs
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .unwrap_or(rhs);
        Ok(Self {
            name: text.to_owned(),
            strategy: StrategyToken::Constant,
            argument: format!("{lhs} {constant}"),
        })
    }

    /// 인자를 공백 기준으로 나눕니다.
    pub fn args(&self) -> Vec<&str> {
        self.argument.split_whitespace().collect()
    }

    /// 계획 파일 2번째 줄에 쓰일 정규 형태
    pub fn to_reference_text(&self) -> String {
        // 비교식에서 온 참조는 이름이 곧 원문
        if self.name.contains("==") {
            return self.name.clone();
        }
        match self.strategy {
            StrategyToken::Default => self.name.clone(),
            strategy if self.argument.is_empty() => format!("{}: {strategy}", self.name),
            strategy => format!("{}: {strategy} {}", self.name, self.argument),
        }
    }
}

impl fmt::Display for InvariantReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_strategy() {
        let r = InvariantReference::parse("no-data-loss: const rows 100").unwrap();
        assert_eq!(r.name, "no-data-loss");
        assert_eq!(r.strategy, StrategyToken::Constant);
        assert_eq!(r.args(), vec!["rows", "100"]);
    }

    #[test]
    fn explicit_strategy_without_argument() {
        let r = InvariantReference::parse("clean-exit: exit-status").unwrap();
        assert_eq!(r.strategy, StrategyToken::ExitStatus);
        assert!(r.argument.is_empty());
    }

    #[test]
    fn unknown_strategy_rejected() {
        let err = InvariantReference::parse("x: teleport a b").unwrap_err();
        assert!(matches!(err, PlanError::UnknownStrategy(ref s) if s == "teleport"));
    }

    #[test]
    fn comparison_against_node_variable_is_equality() {
        let r = InvariantReference::parse("Gossiper.live == nd.Gossiper.live").unwrap();
        assert_eq!(r.strategy, StrategyToken::Equality);
        assert_eq!(r.args(), vec!["Gossiper.live", "nd.Gossiper.live"]);
        assert_eq!(r.name, "Gossiper.live == nd.Gossiper.live");
    }

    #[test]
    fn comparison_against_numbered_node_variable_is_equality() {
        let r = InvariantReference::parse("nd1-Gossiper.live == nd-2-Gossiper.live").unwrap();
        assert_eq!(r.strategy, StrategyToken::Equality);
        assert_eq!(r.args(), vec!["nd1-Gossiper.live", "nd-2-Gossiper.live"]);
    }

    #[test]
    fn comparison_against_nd_word_is_constant() {
        // `nd`로 시작할 뿐 노드 범위가 아닌 값
        for rhs in ["ndb", "nd", "nd3", "nd.", "\"nd-ready\""] {
            let r = InvariantReference::parse(&format!("Table.engine == {rhs}")).unwrap();
            assert_eq!(r.strategy, StrategyToken::Constant, "{rhs}");
        }
    }

    #[test]
    fn node_id_split() {
        assert_eq!(split_node_id("nd.Gossiper.live"), Some(("nd", "Gossiper.live")));
        assert_eq!(split_node_id("nd12-rows"), Some(("nd12", "rows")));
        assert_eq!(split_node_id("nd-3-rows"), Some(("nd-3", "rows")));
        assert_eq!(split_node_id("nd12-"), None);
        assert_eq!(split_node_id("ndb"), None);
        assert_eq!(split_node_id("node_count"), None);
        assert_eq!(split_node_id("rows"), None);
    }

    #[test]
    fn comparison_against_constant_strips_quotes() {
        let r = InvariantReference::parse("Table.state == \"NORMAL\"").unwrap();
        assert_eq!(r.strategy, StrategyToken::Constant);
        assert_eq!(r.args(), vec!["Table.state", "NORMAL"]);
    }

    #[test]
    fn bare_name_defaults() {
        let r = InvariantReference::parse("no-data-loss").unwrap();
        assert_eq!(r, InvariantReference::named("no-data-loss"));
        assert_eq!(r.to_reference_text(), "no-data-loss");
    }

    #[test]
    fn bare_sentence_rejected() {
        assert!(InvariantReference::parse("no data loss").is_err());
        assert!(InvariantReference::parse("   ").is_err());
        assert!(InvariantReference::parse(": const a b").is_err());
    }

    #[test]
    fn reference_text_reparses_to_same_value() {
        let r = InvariantReference::parse("order: ordered 3 7").unwrap();
        assert_eq!(InvariantReference::parse(&r.to_reference_text()).unwrap(), r);
    }
}
