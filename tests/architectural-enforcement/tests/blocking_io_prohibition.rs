//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the client crates MUST NOT use blocking I/O.
//! **Required**: `reqwest` async client, `tokio::io` for the terminal.
//!
//! Blocking calls in plain functions (configuration loading before the
//! runtime does anything else) are acceptable.

use architectural_enforcement::{assert_no_violations, production_lines, PRODUCTION_DIRS};

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations: Vec<_> = production_lines(PRODUCTION_DIRS)
        .into_iter()
        .filter(|line| {
            let code = &line.code;
            code.contains("reqwest::blocking")
                || code.contains("std::net::")
                || code.contains("std::process::Command")
                || (line.in_async_fn
                    && (code.contains("std::fs::")
                        || code.contains("std::io::stdin()")
                        || code.contains("read_line(")
                            && !code.contains(".await")))
        })
        .collect();

    assert_no_violations(
        "Blocking I/O found in async production code",
        &violations,
        &[
            "❌ FORBIDDEN: std::fs / std::io::stdin() in async fn, std::net, reqwest::blocking",
            "✅ REQUIRED: tokio::io::BufReader::new(tokio::io::stdin()).lines(), reqwest::Client",
        ],
    );
}
