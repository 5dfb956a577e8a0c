//! 메트릭 상수
//!
//! 모든 메트릭의 이름을 중앙에서 정의합니다.
//! 각 컴포넌트는 이 상수로 `metrics::counter!()` 등을 호출합니다.
//! 익스포터는 설치하지 않으며, 임베딩하는 쪽에서 레코더를 설치할 수 있습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `faultline_`
//! - 컴포넌트명: `trial_`, `injector_`, `channel_`, `checker_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(faultline_core::metrics::TRIALS_TOTAL, "outcome" => "pass").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 트라이얼 판정 레이블 키 (pass, violation, inconclusive, engine_error)
pub const LABEL_OUTCOME: &str = "outcome";

/// 장애 액션 레이블 키 (kill, pause, resume, delay, partition, corrupt)
pub const LABEL_ACTION: &str = "action";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 불변식 전략 레이블 키
pub const LABEL_STRATEGY: &str = "strategy";

// ─── Trial Runner 메트릭 ────────────────────────────────────────────

/// 완료된 트라이얼 수 (counter, label: outcome)
pub const TRIALS_TOTAL: &str = "faultline_trials_total";

/// 트라이얼 소요 시간 (histogram, 초)
pub const TRIAL_DURATION_SECONDS: &str = "faultline_trial_duration_seconds";

/// 정리 스크립트 경고 수 (counter)
pub const TRIAL_CLEANUP_WARNINGS_TOTAL: &str = "faultline_trial_cleanup_warnings_total";

/// 드라이버 종료로 건너뛴 이벤트 수 (counter)
pub const TRIAL_EVENTS_SKIPPED_TOTAL: &str = "faultline_trial_events_skipped_total";

// ─── Channel 메트릭 ────────────────────────────────────────────────

/// 보고된 체크포인트 수 (counter)
pub const CHANNEL_CHECKPOINTS_TOTAL: &str = "faultline_channel_checkpoints_total";

/// 거부된 연결 수 (counter)
pub const CHANNEL_CONNECTIONS_REJECTED_TOTAL: &str = "faultline_channel_connections_rejected_total";

// ─── Injector 메트릭 ───────────────────────────────────────────────

/// 장애 주입 시도 수 (counter, labels: action, result)
pub const INJECTOR_INJECTIONS_TOTAL: &str = "faultline_injector_injections_total";

/// 티어다운 힐링 실패 수 (counter)
pub const INJECTOR_HEAL_FAILURES_TOTAL: &str = "faultline_injector_heal_failures_total";

// ─── Checker 메트릭 ────────────────────────────────────────────────

/// 불변식 검사 수 (counter, labels: strategy, outcome)
pub const CHECKER_CHECKS_TOTAL: &str = "faultline_checker_checks_total";
