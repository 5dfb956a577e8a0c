#![no_main]

use faultline_core::invariant::InvariantReference;
use faultline_invariant::{CheckerConfig, ResolvedStrategy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(reference) = InvariantReference::parse(text) else {
        return;
    };

    // 정규 형태는 같은 참조로 파싱되어야 한다
    let reparsed = InvariantReference::parse(&reference.to_reference_text())
        .expect("canonical reference must parse");
    assert_eq!(reparsed, reference);

    // 해석은 Ok 또는 Err, 패닉은 안 된다
    let _ = ResolvedStrategy::resolve(&reference, &CheckerConfig::default());
});
