#![no_main]

use faultline_core::plan::parse_invariant_list;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(list) = parse_invariant_list(text, "fuzz-input") {
        assert!(!list.is_empty(), "a parsed list always has an entry");
    }
});
