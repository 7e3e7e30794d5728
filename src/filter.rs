//! Include/exclude filtering of remote URLs
//!
//! Patterns are matched against the full remote URL, either literally or as
//! a shell glob. `*` also matches `/`, so `*/archived/*` catches any URL with
//! an `archived` path segment.

use crate::config::Source;
use glob::Pattern;

/// True if `remote_url` should not be mirrored for `source`
pub fn should_skip(source: &Source, remote_url: &str) -> bool {
    if matches_any(&source.exclude, remote_url) {
        return true;
    }
    if !source.include.is_empty() && !matches_any(&source.include, remote_url) {
        return true;
    }
    false
}

/// Literal or glob match against any pattern; malformed globs never match
fn matches_any(patterns: &[String], remote_url: &str) -> bool {
    patterns.iter().any(|pattern| {
        pattern == remote_url
            || Pattern::new(pattern)
                .map(|glob| glob.matches(remote_url))
                .unwrap_or(false)
    })
}
