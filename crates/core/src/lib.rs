#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod invariant;
pub mod metrics;
pub mod plan;
pub mod result;
pub mod state;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    ChannelError, ConfigError, FaultlineError, InjectionError, InvariantError, PlanError,
};

// 설정
pub use config::FaultlineConfig;

// 실패 계획
pub use invariant::{InvariantReference, StrategyToken};
pub use plan::{FailurePlan, load_invariant_list, parse_invariant_list};

// 결과 / 상태
pub use result::{Diagnostics, TrialOutcome, TrialResult};
pub use state::CampaignState;

// 도메인 타입
pub use types::{CheckpointId, CorruptSpec, FaultAction, FaultEvent, Stage};
