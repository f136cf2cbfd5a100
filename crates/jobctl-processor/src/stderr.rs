//! Stderr tail parsing for executor-reported failures.

use std::sync::OnceLock;

use regex::Regex;

fn exception_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"tracdap\.rt\.exceptions\.(E\w+): (.+)").expect("static pattern is valid")
    })
}

/// Extract the short status message from a captured stderr tail, e.g.
/// `tracdap.rt.exceptions.EValidation: input schema mismatch` -> the
/// message after the colon. Falls back to the full tail, first line only,
/// when the pattern doesn't match.
pub fn short_message(stderr_tail: &str) -> String {
    if let Some(captures) = exception_pattern().captures(stderr_tail) {
        return captures[2].trim().to_string();
    }
    stderr_tail
        .lines()
        .next()
        .unwrap_or(stderr_tail)
        .trim()
        .to_string()
}
