//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the client crates MUST NOT call sleep.
//! Streaming waits on the packet channel and cancellation waits on its
//! token; nothing polls.

use architectural_enforcement::{assert_no_violations, production_lines, PRODUCTION_DIRS};

#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<_> = production_lines(PRODUCTION_DIRS)
        .into_iter()
        .filter(|line| {
            line.code.contains("thread::sleep")
                || line.code.contains("time::sleep")
                || line.code.contains("sleep_until")
        })
        .collect();

    assert_no_violations(
        "Sleep calls found in production code",
        &violations,
        &[
            "❌ FORBIDDEN: sleep in polling loops, sleep as synchronization",
            "✅ REQUIRED: await the channel, the CancellationToken, or a timeout on the request",
        ],
    );
}
