//! Case-insensitive regex tables compiled once per process

use regex::{Regex, RegexBuilder};

/// Compile patterns case-insensitively, skipping any that fail to compile
pub(crate) fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| compile(pattern))
        .collect()
}

/// Compile a single case-insensitive, multi-line pattern
pub(crate) fn compile(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .ok()
}
