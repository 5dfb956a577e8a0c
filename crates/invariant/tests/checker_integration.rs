//! 통합 테스트 -- 설정 파일에서 만든 검사기로 참조를 판정

use std::collections::BTreeMap;

use faultline_core::config::FaultlineConfig;
use faultline_core::invariant::InvariantReference;
use faultline_core::types::CheckpointId;
use faultline_invariant::{CheckOutcome, CheckerConfig, InvariantChecker, TrialObservation};

fn checker_from(toml: &str) -> InvariantChecker {
    let config = FaultlineConfig::parse(toml).unwrap();
    InvariantChecker::new(CheckerConfig::from_core(&config.invariant).unwrap())
}

fn observation() -> TrialObservation {
    let mut state = BTreeMap::new();
    state.insert("rows".to_owned(), "100".to_owned());
    state.insert("n1.role".to_owned(), "leader".to_owned());
    state.insert("n2.role".to_owned(), "follower".to_owned());
    TrialObservation {
        trial_id: "t-1".to_owned(),
        output_tail: vec!["inserted 100 rows".to_owned(), "done".to_owned()],
        exit_code: Some(0),
        checkpoints_seen: ["1", "2", "3"].into_iter().map(CheckpointId::from).collect(),
        state,
        ..Default::default()
    }
}

#[tokio::test]
async fn plan_style_references_pass_on_healthy_run() {
    let checker = checker_from("");
    for text in [
        "no-data-loss",
        "rows == \"100\"",
        "single-leader: exclusive role leader",
        "progress: reaches 3",
        "order: ordered 1 3",
        "clean-exit: exit-status",
    ] {
        let reference = InvariantReference::parse(text).unwrap();
        let outcome = checker.check(&reference, &observation()).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Pass, "{text}");
    }
}

#[tokio::test]
async fn exit_status_default_strategy_from_config() {
    let checker = checker_from(
        r#"
[invariant]
default_strategy = "exit-status"
"#,
    );
    let obs = TrialObservation {
        exit_code: Some(3),
        ..observation()
    };
    let outcome = checker
        .check(&InvariantReference::named("anything"), &obs)
        .await
        .unwrap();
    assert_eq!(outcome, CheckOutcome::violation("driver exited with status 3"));
}

#[cfg(unix)]
#[tokio::test]
async fn configured_probe_runs_for_bare_name() {
    let checker = checker_from(
        r#"
[invariant.probes]
no-data-loss = "test \"$FAULTLINE_TRIAL_ID\" = t-1"
"#,
    );
    let outcome = checker
        .check(&InvariantReference::named("no-data-loss"), &observation())
        .await
        .unwrap();
    assert_eq!(outcome, CheckOutcome::Pass);
}

#[tokio::test]
async fn custom_marker_violation_carries_line() {
    let checker = checker_from("");
    let obs = TrialObservation {
        output_tail: vec!["ERROR: replica diverged".to_owned()],
        ..observation()
    };
    let reference = InvariantReference::parse("diverge: output-marker replica diverged").unwrap();
    let outcome = checker.check(&reference, &obs).await.unwrap();
    assert_eq!(
        outcome,
        CheckOutcome::violation("driver output contains 'replica diverged': ERROR: replica diverged")
    );
}
