//! Keeps restic's diagnostics small enough to travel as a status message.
//!
//! restic prints its fatal error last, so the tail is what survives.

/// Maximum characters of stderr carried into an error message.
pub const DEFAULT_MAX_CHARS: usize = 2_000;

/// Trim `output` and keep at most its last `max_chars` characters, prefixed
/// with a marker when anything was dropped.
pub fn tail(output: &str, max_chars: usize) -> String {
    let trimmed = output.trim();
    let total = trimmed.chars().count();
    if total <= max_chars {
        return trimmed.to_owned();
    }

    // Character-aware so multi-byte sequences are never split.
    let kept: String = trimmed.chars().skip(total - max_chars).collect();
    format!("[{} chars omitted] ...{kept}", total - max_chars)
}
