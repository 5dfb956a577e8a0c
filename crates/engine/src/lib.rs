#![doc = include_str!("../README.md")]
//!
//! # 모듈 구조
//!
//! - [`config`]: 엔진 설정 (`EngineConfig`)
//! - [`channel`]: 계측 채널 (`InstrumentationChannel`, `TcpChannel`, `MemoryChannel`)
//! - [`driver`]: SUT 드라이버 프로세스 (`ScriptCommand`, `DriverProcess`)
//! - [`cleanup`]: 정리 스크립트 가드 (`CleanupGuard`)
//! - [`trial`]: 트라이얼 러너 상태 기계 (`TrialRunner`)
//! - [`report`]: 결과 로그와 위반 기록 (`ResultRecorder`)
//! - [`campaign`]: 캠페인 오케스트레이터 (`Campaign`)
//!
//! # 흐름
//!
//! ```text
//! Campaign --(CampaignState &mut)--> TrialRunner
//!                                        |
//!            FailurePlan ----------------+
//!            DriverProcess <--env-- TcpChannel <--checkpoint/release--> driver
//!                                        |
//!                                  FaultInjector (이벤트 발생, 힐링)
//!                                        |
//!                                  InvariantChecker --> TrialResult
//!                                        |
//!                                  CleanupGuard --> ResultRecorder
//! ```

pub mod campaign;
pub mod channel;
pub mod cleanup;
pub mod config;
pub mod driver;
pub mod report;
pub mod trial;

// --- 공개 API re-export ---

// 캠페인
pub use campaign::{Campaign, CampaignReport, CampaignSummary};

// 트라이얼
pub use trial::{PlanSource, TrialRunner, TrialSpec, TrialState};

// 채널
pub use channel::{
    ChannelEvent, ChannelMessage, ChannelReports, InstrumentationChannel, MemoryChannel,
    MemoryDriverHandle, ReleaseGranted, TcpChannel,
};

// 드라이버
pub use driver::{DriverEnv, DriverExit, ScriptCommand};

// 설정
pub use config::{CampaignPaths, ChannelSettings, EngineConfig, TrialSettings};

// 기록
pub use report::ResultRecorder;
