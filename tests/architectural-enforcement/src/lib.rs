//! Architectural Enforcement Integration Tests
//!
//! Source scanners shared by the integration tests in `tests/`, which
//! enforce these rules on the client crates:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//! - No unwrap()/expect() in library code
//!
//! Production code is everything under the source directories up to the
//! first `#[cfg(test)]` line of each file.

use std::fs;
use std::path::{Path, PathBuf};

/// Source directories holding production code, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["client/core/src", "client/cli/src"];

/// Library source directories (stricter rules apply)
pub const LIBRARY_DIRS: &[&str] = &["client/core/src"];

/// One line of production code
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line comes from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Line text with any trailing `//` comment removed
    pub code: String,
    /// Whether the line sits inside an `async fn`
    pub in_async_fn: bool,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.code.trim())
    }
}

/// Workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files under `dir`
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Production lines of every file under the given directories
#[must_use]
pub fn production_lines(dirs: &[&str]) -> Vec<SourceLine> {
    let root = workspace_root();
    let mut lines = Vec::new();

    for dir in dirs {
        for path in rust_files(&root.join(dir)) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            lines.extend(scan_source(&path, &content));
        }
    }

    lines
}

/// Split source text into production lines
///
/// Stops at the first `#[cfg(test)]`. Doc and line comments are dropped.
#[must_use]
pub fn scan_source(path: &Path, content: &str) -> Vec<SourceLine> {
    let all: Vec<&str> = content.lines().collect();
    let mut lines = Vec::new();

    for (idx, line) in all.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }

        let code = line.split("//").next().unwrap_or(line).to_string();
        lines.push(SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code,
            in_async_fn: is_in_async_function(&all, idx),
        });
    }

    lines
}

/// Whether the line at `current_idx` is inside an `async fn`
///
/// Scans backwards to the nearest function signature.
#[must_use]
pub fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..=current_idx).rev() {
        let line = lines[i].trim();

        if line.contains("async fn ") {
            return true;
        }
        if line.starts_with("fn ") || line.contains(" fn ") {
            return false;
        }
        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return false;
        }
    }
    false
}

/// Report violations and fail the calling test
///
/// # Panics
///
/// When `violations` is not empty.
pub fn assert_no_violations(rule: &str, violations: &[SourceLine], help: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in help {
        eprintln!("  {line}");
    }

    panic!(
        "\nFound {} violation(s) of: {rule}\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_function_detection() {
        let code = [
            "pub async fn load() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
            "fn parse() {",
            "    let contents = std::fs::read_to_string(\"config.toml\")?;",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_async_function(&code, 4));
    }

    #[test]
    fn test_scan_stops_at_test_module() {
        let source = "fn run() {\n    work(); // inline note\n}\n#[cfg(test)]\nmod tests {\n    fn t() { x.unwrap(); }\n}\n";
        let lines = scan_source(Path::new("lib.rs"), source);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].code.trim(), "work();");
        assert!(lines.iter().all(|l| !l.code.contains("unwrap")));
    }

    #[test]
    fn test_workspace_root_contains_client() {
        assert!(workspace_root().join("client").join("core").exists());
    }
}
