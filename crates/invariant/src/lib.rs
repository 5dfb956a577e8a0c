#![doc = include_str!("../README.md")]
//!
//! # 모듈 구조
//!
//! - [`config`]: 검사기 설정 (`CheckerConfig`)
//! - [`observation`]: 트라이얼 관찰 (`TrialObservation`)
//! - [`outcome`]: 판정 (`CheckOutcome`)
//! - [`strategy`]: 전략 trait과 구체 전략 (`InvariantStrategy`, `ResolvedStrategy`)
//! - [`checker`]: 검사기 (`InvariantChecker`)

pub mod checker;
pub mod config;
pub mod observation;
pub mod outcome;
pub mod strategy;

// --- 공개 API re-export ---

pub use checker::InvariantChecker;
pub use config::CheckerConfig;
pub use observation::TrialObservation;
pub use outcome::CheckOutcome;
pub use strategy::{InvariantKind, InvariantStrategy, ResolvedStrategy, Unavailable, evaluate};
