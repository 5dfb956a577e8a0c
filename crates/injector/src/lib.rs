#![doc = include_str!("../README.md")]
//!
//! # 모듈 구조
//!
//! - [`error`]: 주입기 에러 타입 (`InjectorError`)
//! - [`config`]: 주입기 설정 (`FaultInjectorConfig`, 빌더)
//! - [`registry`]: 대상 이름 해석 (`TargetRegistry`, `TargetSpec`, `Endpoint`)
//! - [`controller`]: OS 제어 추상화 (`TargetController` trait, `ProcessController`)
//! - [`corrupt`]: 파일 손상과 복원
//! - [`injector`]: 주입 실행과 장애 원장 (`FaultInjector`)
//!
//! # 흐름
//!
//! ```text
//! FaultEvent --> FaultInjector.inject()
//!                    |
//!               TargetRegistry (name -> pid / address / data_dir)
//!                    |
//!               TargetController (signal, partition) | corrupt (snapshot -> ledger -> apply)
//!                    |
//!               FaultLedger --> heal_all() / lingering_faults()
//! ```

pub mod config;
pub mod controller;
pub mod corrupt;
pub mod error;
pub mod injector;
pub mod registry;

// --- 공개 API re-export ---

// 주입기
pub use injector::{FaultInjector, FaultLedger, InjectionRecord};

// 설정
pub use config::{FaultInjectorConfig, FaultInjectorConfigBuilder};

// 에러
pub use error::InjectorError;

// 대상 제어
#[cfg(any(test, feature = "test-util"))]
pub use controller::MockTargetController;
pub use controller::{ProcessController, TargetController, TargetSignal};

// 레지스트리
pub use registry::{Endpoint, TargetRegistry, TargetSpec};
