//! Integration Test: Panic Prohibition in Library Code
//!
//! **Policy**: The client core propagates errors with `?` and `ChatError`.
//! Library code MUST NOT call `unwrap()`, `expect()` or `panic!()` outside
//! of tests.

use architectural_enforcement::{assert_no_violations, production_lines, LIBRARY_DIRS};

#[test]
fn test_no_unwrap_in_library_code() {
    let violations: Vec<_> = production_lines(LIBRARY_DIRS)
        .into_iter()
        .filter(|line| {
            line.code.contains(".unwrap()")
                || line.code.contains(".expect(")
                || line.code.contains("panic!(")
        })
        .collect();

    assert_no_violations(
        "Panicking calls found in library code",
        &violations,
        &[
            "✅ REQUIRED: return Result<_, ChatError> and use ?",
            "✅ ACCEPTABLE: unwrap_or, unwrap_or_default, unwrap_or_else",
        ],
    );
}
