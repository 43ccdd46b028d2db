//! Anchored pattern validation shared by the engine and any UI layer.
//!
//! Blueprint patterns must match the whole value. Authors usually write `^...$`
//! already, but the check does not rely on it: every pattern is wrapped in a
//! non-capturing group anchored at both ends before compiling.

use regex::Regex;

/// Compiles `pattern` so that it only accepts full matches.
pub fn anchored_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}
