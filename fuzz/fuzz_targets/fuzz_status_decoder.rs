//! Fuzz target: `StatusDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming status decoder and
//! asserts that it never panics, never over-reports consumed bytes, and
//! only yields packets whose parameters fit the fixed buffer.
//!
//! cargo fuzz run fuzz_status_decoder

#![no_main]

use gripper_rl::drivers::servo::protocol::{MAX_STATUS_PARAMS, StatusDecoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = StatusDecoder::new();

    let mut rest = data;
    while !rest.is_empty() {
        let (used, result) = decoder.feed(rest);
        assert!(used >= 1 && used <= rest.len(), "feed consumed {used} of {}", rest.len());
        if let Some(Ok(packet)) = result {
            assert!(packet.params.len() <= MAX_STATUS_PARAMS);
            let _ = packet.value(4);
        }
        rest = &rest[used..];
    }

    // A reset mid-stream must leave the decoder usable.
    decoder.reset();
    let _ = decoder.feed(data);
});
