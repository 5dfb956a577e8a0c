#![no_main]

use faultline_core::plan::FailurePlan;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // 크래시나 패닉 없이 Ok 또는 Err을 반환해야 한다
    if let Ok(plan) = FailurePlan::parse(text) {
        // 정규 형태로 다시 쓴 계획은 같은 계획으로 파싱되어야 한다
        let reparsed = FailurePlan::parse(&plan.to_plan_text())
            .expect("canonical plan text must parse");
        assert_eq!(reparsed, plan);
    }
});
