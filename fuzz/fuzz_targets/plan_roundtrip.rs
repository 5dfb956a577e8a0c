#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use faultline_core::plan::FailurePlan;

/// 퍼저용 구조적 이벤트 입력
#[derive(Arbitrary, Debug)]
struct FuzzEvent {
    checkpoint: u16,
    target: u8,
    action: FuzzAction,
}

#[derive(Arbitrary, Debug)]
enum FuzzAction {
    Kill,
    Pause,
    Resume,
    Delay(u16),
    Partition(Vec<u8>),
    Corrupt(u8),
}

const TARGETS: [&str; 4] = ["leader", "follower", "witness", "node-3"];

fn target(idx: u8) -> &'static str {
    TARGETS[idx as usize % TARGETS.len()]
}

impl FuzzAction {
    fn to_fields(&self) -> String {
        match self {
            Self::Kill => "kill".to_owned(),
            Self::Pause => "pause".to_owned(),
            Self::Resume => "resume".to_owned(),
            Self::Delay(ms) => format!("delay | {ms}ms"),
            Self::Partition(peers) => {
                let peers: Vec<&str> = peers.iter().take(4).map(|p| target(*p)).collect();
                if peers.is_empty() {
                    "partition | leader".to_owned()
                } else {
                    format!("partition | {}", peers.join(","))
                }
            }
            Self::Corrupt(offset) => format!("corrupt | zero:data/wal.log:{offset}:8"),
        }
    }
}

fuzz_target!(|events: Vec<FuzzEvent>| {
    // 이벤트 수 제한 (퍼징 성능)
    let mut events: Vec<&FuzzEvent> = events.iter().take(64).collect();
    events.sort_by_key(|e| e.checkpoint);

    let mut text = String::from("faultline-plan fuzz\nsurvives\n");
    for event in &events {
        text.push_str(&format!(
            "{} | {} | {}\n",
            event.checkpoint,
            target(event.target),
            event.action.to_fields()
        ));
    }

    // 중복 (체크포인트, 대상) 등은 Err이어도 되지만 패닉은 안 된다
    if let Ok(plan) = FailurePlan::parse(&text) {
        assert_eq!(plan.events.len(), events.len());
        let reparsed = FailurePlan::parse(&plan.to_plan_text())
            .expect("canonical plan text must parse");
        assert_eq!(reparsed, plan);
    }
});
