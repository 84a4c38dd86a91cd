//! In-place softening of versioning scripts that abort without git

use crate::utils::patterns::compile;
use regex::Regex;
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;

/// Scripts rewritten by [`patch_version_scripts`]
const PATCHABLE_SCRIPTS: &[&str] = &[
    "cmake/versioning.cmake",
    "cmake/version.cmake",
    "cmake/GitVersion.cmake",
];

const BACKUP_SUFFIX: &str = ".orig";

fn fatal_versioning_message() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            compile(r"message\s*\(\s*FATAL_ERROR\s+([^)]*(?:git|commit|version|cache)[^)]*)\)")
        })
        .as_ref()
}

/// Rewrite `content`, returning `None` when nothing changes
///
/// Fatal messages mentioning git, commit, version or cache become warnings.
/// Scripts that reference `GIT_COMMIT`, `GIT_COMMIT_ID` or `GIT_VERSION`
/// without setting them get a guarded block of fallback values prepended.
pub(super) fn patch_script(content: &str, version: &str, short_hash: &str) -> Option<String> {
    let mut patched = match fatal_versioning_message() {
        Some(re) => re.replace_all(content, "message(WARNING ${1})").into_owned(),
        None => content.to_string(),
    };

    let mut fallbacks = Vec::new();
    if patched.contains("GIT_COMMIT") && !patched.contains("set(GIT_COMMIT") {
        fallbacks.push(format!(
            "set(GIT_COMMIT \"{short_hash}\" CACHE STRING \"Git commit (tarball build)\")"
        ));
    }
    if patched.contains("GIT_COMMIT_ID") && !patched.contains("set(GIT_COMMIT_ID") {
        fallbacks.push(format!(
            "set(GIT_COMMIT_ID \"{short_hash}\" CACHE STRING \"Git commit ID (tarball build)\")"
        ));
    }
    if patched.contains("GIT_VERSION") && !patched.contains("set(GIT_VERSION") {
        fallbacks.push(format!(
            "set(GIT_VERSION \"{version}\" CACHE STRING \"Version (tarball build)\")"
        ));
    }

    if !fallbacks.is_empty() {
        let body: Vec<String> = fallbacks.iter().map(|line| format!("  {line}")).collect();
        patched = format!(
            "\n# Fallback values for tarball builds (added by srcforge)\n\
             if(NOT DEFINED GIT_COMMIT)\n{}\nendif()\n\n{patched}",
            body.join("\n")
        );
    }

    (patched != content).then_some(patched)
}

/// Patch every known versioning script under `source_dir`
///
/// The first pristine copy of each rewritten script is kept next to it with
/// an `.orig` suffix; an existing backup is never overwritten. Returns the
/// relative paths of the scripts that changed.
pub(super) async fn patch_version_scripts(
    source_dir: &Path,
    version: &str,
    short_hash: &str,
) -> io::Result<Vec<String>> {
    let mut patched_files = Vec::new();

    for script in PATCHABLE_SCRIPTS {
        let path = source_dir.join(script);
        let Ok(content) = fs::read_to_string(&path).await else {
            continue;
        };
        let Some(patched) = patch_script(&content, version, short_hash) else {
            continue;
        };

        let mut backup = path.clone().into_os_string();
        backup.push(BACKUP_SUFFIX);
        if !fs::try_exists(&backup).await.unwrap_or(false) {
            fs::write(&backup, &content).await?;
        }
        fs::write(&path, patched).await?;
        tracing::debug!(script = %script, "patched versioning script");
        patched_files.push((*script).to_string());
    }

    Ok(patched_files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "execute_process(COMMAND git rev-parse HEAD OUTPUT_VARIABLE GIT_COMMIT)\n\
        if(NOT GIT_COMMIT)\n  message(FATAL_ERROR \"Could not gather commit id\")\nendif()\n";

    #[test]
    fn test_fatal_error_becomes_warning() {
        let patched = patch_script(SCRIPT, "1.2.3", "abcdef1").unwrap();
        assert!(patched.contains("message(WARNING \"Could not gather commit id\")"));
        assert!(!patched.contains("FATAL_ERROR"));
        assert!(patched.starts_with("\n# Fallback values for tarball builds"));
        assert!(patched.contains("  set(GIT_COMMIT \"abcdef1\" CACHE STRING"));
        assert!(!patched.contains("GIT_VERSION \"1.2.3\""));
    }

    #[test]
    fn test_unrelated_fatal_error_untouched() {
        let script = "message(FATAL_ERROR \"C++17 compiler required\")\n";
        assert_eq!(patch_script(script, "1.0", "abcdef1"), None);
    }

    #[tokio::test]
    async fn test_backup_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cmake")).unwrap();
        let script = dir.path().join("cmake/version.cmake");
        std::fs::write(&script, SCRIPT).unwrap();
        std::fs::write(dir.path().join("cmake/version.cmake.orig"), "original").unwrap();

        let patched = patch_version_scripts(dir.path(), "1.0", "abcdef1")
            .await
            .unwrap();
        assert_eq!(patched, vec!["cmake/version.cmake"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("cmake/version.cmake.orig")).unwrap(),
            "original"
        );

        // Second pass finds nothing left to change
        let again = patch_version_scripts(dir.path(), "1.0", "abcdef1")
            .await
            .unwrap();
        assert!(again.is_empty());
    }
}
