//! Classification of configure output into versioning issues

use super::{GitVersioningIssue, VersioningIssueKind};
use crate::utils::patterns::compile_all;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;

/// Scripts that commonly compute a version from git, in lookup order
const VERSION_SCRIPTS: &[&str] = &[
    "cmake/versioning.cmake",
    "cmake/version.cmake",
    "cmake/GitVersion.cmake",
    "cmake/GetGitRevisionDescription.cmake",
];

const EXTRA_CMAKE_MODULE: &str = "cmake/modules/GetGitRevisionDescription.cmake";

const CACHE_REFERENCE_PATTERNS: &[&str] = &[
    r#"file\s*\(\s*READ\s+["\$\{]*(?:CMAKE_SOURCE_DIR|PROJECT_SOURCE_DIR|CMAKE_CURRENT_SOURCE_DIR)[}\s/"]*([^"\s\)]+)"#,
    r#"set\s*\(\s*\w*CACHE\w*\s+["\$\{]*(?:CMAKE_SOURCE_DIR|PROJECT_SOURCE_DIR)[}\s/"]*([^"\s\)]+)"#,
    r#"if\s*\(\s*EXISTS\s+["\$\{]*(?:CMAKE_SOURCE_DIR|PROJECT_SOURCE_DIR)[}\s/"]*([^"\s\)]+)"#,
];

const CACHE_NAME_HINTS: &[&str] = &["commit", "version", "cache", ".git"];

const GIT_VARIABLES: &[&str] = &["git_version", "git_commit", "git_hash", "git_tag"];

fn cache_reference_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile_all(CACHE_REFERENCE_PATTERNS))
}

fn quoted_cache_name() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"["'](/[^"']+|[^"'\s]+\.(?:txt|cache|id))["']"#).ok())
        .as_ref()
}

/// Inspect failed configure output and the source tree for versioning issues
///
/// Issues are reported in a fixed order: cache file, describe or other git
/// commands, CMake variables, then a generic catch-all only when nothing more
/// specific matched. The result may be empty.
pub async fn detect_issues(source_dir: &Path, output: &str) -> Vec<GitVersioningIssue> {
    let lower = output.to_lowercase();
    let mut issues = Vec::new();

    if lower.contains("cache") && (lower.contains("git commit") || lower.contains("commit id")) {
        let cache_file_path = find_cache_file(source_dir).await;
        let fix_description = cache_file_path.as_ref().map_or_else(
            || "Create VERSION file".to_string(),
            |path| format!("Create cache file at: {path}"),
        );
        issues.push(GitVersioningIssue {
            kind: VersioningIssueKind::CacheFile,
            description: "Project expects a version/commit cache file for tarball builds"
                .to_string(),
            cmake_file: None,
            cache_file_path,
            fix_description,
        });
    }

    let describe_failed =
        lower.contains("git describe") && (lower.contains("failed") || lower.contains("error"));
    if describe_failed {
        issues.push(GitVersioningIssue {
            kind: VersioningIssueKind::DescribeFailure,
            description: "Project uses 'git describe' for versioning".to_string(),
            cmake_file: None,
            cache_file_path: None,
            fix_description: "Initialize git repo with tagged commit".to_string(),
        });
    } else if lower.contains("git rev-parse") || lower.contains("git log") {
        issues.push(GitVersioningIssue {
            kind: VersioningIssueKind::DescribeFailure,
            description: "Project uses git commands for versioning".to_string(),
            cmake_file: None,
            cache_file_path: None,
            fix_description: "Initialize git repo with commit".to_string(),
        });
    }

    if GIT_VARIABLES.iter().any(|var| lower.contains(var)) {
        issues.push(GitVersioningIssue {
            kind: VersioningIssueKind::CmakeVariables,
            description: "Project uses CMake git version variables".to_string(),
            cmake_file: find_version_script(source_dir).await,
            cache_file_path: None,
            fix_description: "Set version variables via CMake cache".to_string(),
        });
    }

    if issues.is_empty() && (lower.contains("gather commit") || lower.contains("gathering commit"))
    {
        issues.push(generic_issue());
    }

    issues
}

/// Catch-all issue used when output points at git but matches nothing specific
#[must_use]
pub(crate) fn generic_issue() -> GitVersioningIssue {
    GitVersioningIssue {
        kind: VersioningIssueKind::Generic,
        description: "Project requires git commit information".to_string(),
        cmake_file: None,
        cache_file_path: None,
        fix_description: "Initialize git repo or create version file".to_string(),
    }
}

async fn find_version_script(source_dir: &Path) -> Option<String> {
    for candidate in VERSION_SCRIPTS.iter().chain(std::iter::once(&EXTRA_CMAKE_MODULE)) {
        if fs::try_exists(source_dir.join(candidate)).await.unwrap_or(false) {
            return Some((*candidate).to_string());
        }
    }
    None
}

/// Cache file path referenced by the first versioning script present
async fn find_cache_file(source_dir: &Path) -> Option<String> {
    for script in VERSION_SCRIPTS {
        let Ok(content) = fs::read_to_string(source_dir.join(script)).await else {
            continue;
        };
        return cache_file_from_script(&content);
    }
    None
}

pub(super) fn cache_file_from_script(content: &str) -> Option<String> {
    for re in cache_reference_patterns() {
        for caps in re.captures_iter(content) {
            let candidate = caps[1].trim_matches(|c| matches!(c, '"' | '\'' | '/'));
            let lower = candidate.to_lowercase();
            if !candidate.is_empty() && CACHE_NAME_HINTS.iter().any(|hint| lower.contains(hint)) {
                return Some(candidate.to_string());
            }
        }
    }

    if content.contains("GIT_COMMIT_CACHE_FILE")
        || content.to_lowercase().contains("git commit cache")
    {
        if let Some(caps) = quoted_cache_name().and_then(|re| re.captures(content)) {
            return Some(caps[1].trim_start_matches('/').to_string());
        }
    }

    None
}
