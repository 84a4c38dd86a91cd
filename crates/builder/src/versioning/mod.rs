//! Workarounds for archives whose build expects git metadata
//!
//! Many projects derive their version from `git describe` or a commit id and
//! fail when built from a release tarball without `.git`. Detection
//! classifies configure output into [`GitVersioningIssue`]s; the
//! [`GitVersioningFixer`] then applies layered, individually best-effort
//! remediations.

mod detect;
mod fixer;
mod patch;

pub use detect::detect_issues;
pub use fixer::{FixReport, GitVersioningFixer, CMAKE_CACHE_FILE};

use crate::utils::patterns::{compile, compile_all};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// Version used when the archive name carries none
pub const DEFAULT_VERSION: &str = "0.0.0";

const SHORT_HASH_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersioningIssueKind {
    /// The build reads a version or commit cache file
    CacheFile,
    /// The build runs `git describe`, `rev-parse` or `log`
    DescribeFailure,
    /// The build expects `GIT_*` variables to be set
    CmakeVariables,
    Generic,
}

impl fmt::Display for VersioningIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CacheFile => "cache_file",
            Self::DescribeFailure => "describe_failure",
            Self::CmakeVariables => "cmake_variables",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// One detected reason the build needs git metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitVersioningIssue {
    pub kind: VersioningIssueKind,
    pub description: String,
    /// Build script that resolves the version, relative to the source root
    pub cmake_file: Option<String>,
    /// Cache file the build script reads, relative to the source root
    pub cache_file_path: Option<String>,
    pub fix_description: String,
}

const VERSION_PATTERNS: &[&str] = &[
    r"-v?(\d+\.\d+\.\d+(?:-\w+)?)",
    r"-v?(\d+\.\d+)",
    r"_v?(\d+\.\d+\.\d+)",
    r"\.v?(\d+\.\d+\.\d+)",
];

fn version_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile_all(VERSION_PATTERNS))
}

/// Version string embedded in an archive file name
///
/// `project-2.4.1.tar.gz` yields `2.4.1`; names without a dotted numeric
/// version yield [`DEFAULT_VERSION`].
#[must_use]
pub fn extract_version(archive_name: &str) -> String {
    let basename = Path::new(archive_name)
        .file_name()
        .map_or_else(|| archive_name.to_string(), |n| n.to_string_lossy().into_owned());

    version_patterns()
        .iter()
        .find_map(|re| re.captures(&basename))
        .map_or_else(|| DEFAULT_VERSION.to_string(), |caps| caps[1].to_string())
}

/// Deterministic stand-in for a commit hash
#[must_use]
pub(crate) fn synthetic_hash(archive_name: &str, version: &str) -> String {
    let digest = Sha256::digest(format!("{archive_name}-{version}").as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn short_hash(full: &str) -> &str {
    &full[..SHORT_HASH_LEN.min(full.len())]
}

const GIT_KEYWORDS: &[&str] = &[
    "git commit",
    "git describe",
    "commit id",
    "gather commit",
    "git rev-parse",
    "git log",
    "git version",
    "git hash",
    "git tag",
    ".git directory",
    "git repository",
];

const ERROR_KEYWORDS: &[&str] = &[
    "not found",
    "failed",
    "could not find",
    "not available",
    "error",
    "cannot",
    "unable to",
    "missing",
];

const EXPLICIT_PATTERNS: &[&str] = &[
    r"not\s+a\s+git\s+repository",
    r"fatal:\s+not\s+a\s+git",
    r"cache\s+file.*not\s+found",
    r"version.*file.*not\s+found",
];

fn explicit_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        EXPLICIT_PATTERNS
            .iter()
            .filter_map(|p| compile(p))
            .collect()
    })
}

/// Whether configure output points at missing git metadata
///
/// True when a git term co-occurs with an error term, or when one of the
/// explicit signatures such as `fatal: not a git repository` appears.
#[must_use]
pub fn is_git_versioning_error(output: &str) -> bool {
    let lower = output.to_lowercase();
    let has_git_ref = GIT_KEYWORDS.iter().any(|kw| lower.contains(kw));
    let has_error = ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw));
    (has_git_ref && has_error) || explicit_patterns().iter().any(|re| re.is_match(&lower))
}
