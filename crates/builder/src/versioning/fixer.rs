//! Layered remediation for builds that need git metadata

use super::detect::{detect_issues, generic_issue};
use super::patch::patch_version_scripts;
use super::{extract_version, short_hash, synthetic_hash, GitVersioningIssue, VersioningIssueKind};
use crate::process::{CommandStatus, RunnerFactory};
use serde::Serialize;
use srcforge_events::{BuildEvent, EventEmitter};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File generated for `cmake -C`
pub const CMAKE_CACHE_FILE: &str = "cmake_version_cache.cmake";

const GIT_EMAIL: &str = "build@localhost";
const GIT_NAME: &str = "Build System";

/// Outcome of [`GitVersioningFixer::apply_fixes`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixReport {
    /// At least one remediation took effect
    pub success: bool,
    pub message: String,
    pub applied: Vec<String>,
    pub errors: Vec<String>,
}

/// Applies versioning workarounds to one extracted source tree
///
/// Every remediation is best effort: a failing step is recorded and the
/// remaining steps still run.
#[derive(Debug)]
pub struct GitVersioningFixer {
    source_dir: PathBuf,
    version: String,
    commit_hash: String,
    runners: RunnerFactory,
    issues: Vec<GitVersioningIssue>,
}

impl GitVersioningFixer {
    /// Fixer for `source_dir`, deriving version and synthetic commit from the archive name
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>, archive_name: &str, runners: RunnerFactory) -> Self {
        let version = extract_version(archive_name);
        let commit_hash = synthetic_hash(archive_name, &version);
        Self {
            source_dir: source_dir.into(),
            version,
            commit_hash,
            runners,
            issues: Vec::new(),
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn commit_hash(&self) -> &str {
        &self.commit_hash
    }

    #[must_use]
    pub fn short_hash(&self) -> &str {
        short_hash(&self.commit_hash)
    }

    #[must_use]
    pub fn issues(&self) -> &[GitVersioningIssue] {
        &self.issues
    }

    /// Classify `output` and remember the issues for [`Self::apply_fixes`]
    pub async fn detect_issues(&mut self, output: &str) -> &[GitVersioningIssue] {
        self.issues = detect_issues(&self.source_dir, output).await;
        &self.issues
    }

    /// Fall back to the generic issue when detection matched nothing specific
    pub fn ensure_generic_issue(&mut self) {
        if self.issues.is_empty() {
            self.issues.push(generic_issue());
        }
    }

    fn progress(&self, message: &str) {
        self.runners.emit_build(BuildEvent::VersioningFixProgress {
            session_id: self.runners.session_id().to_string(),
            message: message.to_string(),
        });
    }

    /// Apply every remediation for the detected issues
    ///
    /// Order: git bootstrap, per-issue files, then script patching. A failed
    /// bootstrap is not reported as an error because the file-based fixes
    /// often suffice on their own.
    pub async fn apply_fixes(&self) -> FixReport {
        if self.issues.is_empty() {
            return FixReport {
                success: true,
                message: "No git versioning issues to fix".to_string(),
                applied: Vec::new(),
                errors: Vec::new(),
            };
        }

        let mut applied = Vec::new();
        let mut errors = Vec::new();

        self.progress("Initializing git repository...");
        match self.bootstrap_repository().await {
            Ok(message) => applied.push(message),
            Err(message) => tracing::debug!(%message, "git bootstrap skipped"),
        }

        for issue in &self.issues {
            let result = match issue.kind {
                VersioningIssueKind::CacheFile => {
                    self.progress("Creating version cache files...");
                    self.write_version_files(issue).await
                }
                VersioningIssueKind::CmakeVariables => {
                    self.progress("Creating CMake version variables...");
                    self.write_cmake_cache().await
                }
                VersioningIssueKind::Generic => {
                    self.progress("Applying generic fixes...");
                    self.write_generic_files().await
                }
                // Covered by the repository bootstrap
                VersioningIssueKind::DescribeFailure => continue,
            };
            match result {
                Ok(message) => applied.push(message),
                Err(message) => errors.push(message),
            }
        }

        self.progress("Patching CMake files...");
        match patch_version_scripts(&self.source_dir, &self.version, self.short_hash()).await {
            Ok(files) if !files.is_empty() => {
                applied.push(format!("Patched CMake files: {}", files.join(", ")));
            }
            Ok(_) => tracing::debug!("No CMake files needed patching"),
            Err(e) => tracing::warn!(error = %e, "patching versioning scripts failed"),
        }

        self.progress("Done applying fixes");

        let message = if applied.is_empty() {
            format!("No fixes could be applied. Errors: {}", errors.join("; "))
        } else if errors.is_empty() {
            format!("Applied fixes: {}", applied.join("; "))
        } else {
            format!(
                "Applied fixes: {} (Some errors: {})",
                applied.join("; "),
                errors.join("; ")
            )
        };

        FixReport {
            success: !applied.is_empty(),
            message,
            applied,
            errors,
        }
    }

    /// Turn the tree into a git repository with one tagged commit
    async fn bootstrap_repository(&self) -> Result<String, String> {
        if fs::try_exists(self.source_dir.join(".git")).await.unwrap_or(false) {
            return Ok("Git repository already exists".to_string());
        }

        let init = self.git(&["init"], 30).await?;
        if !init.0 {
            return Err(format!("git init failed: {}", init.1.trim()));
        }

        let tag = format!("v{}", self.version);
        let commit_message = format!("Tarball build {tag}");
        let tag_message = format!("Version {}", self.version);
        let steps: [(&[&str], u64); 5] = [
            (&["config", "user.email", GIT_EMAIL], 10),
            (&["config", "user.name", GIT_NAME], 10),
            (&["add", "-A"], 60),
            (&["commit", "-m", commit_message.as_str(), "--allow-empty"], 60),
            (&["tag", "-a", tag.as_str(), "-m", tag_message.as_str()], 30),
        ];
        for (args, timeout) in steps {
            let (succeeded, stderr) = self.git(args, timeout).await?;
            if !succeeded {
                tracing::debug!(command = ?args, stderr = %stderr.trim(), "git step failed");
            }
        }

        Ok(format!("Initialized git repo with tag {tag}"))
    }

    /// Run one git subcommand, returning exit success and stderr
    async fn git(&self, args: &[&str], timeout_secs: u64) -> Result<(bool, String), String> {
        let argv: Vec<String> = std::iter::once("git")
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect();
        let outcome = self
            .runners
            .runner_with_timeout(timeout_secs)
            .run(&argv, &self.source_dir, None)
            .await
            .map_err(|e| format!("Git initialization failed: {e}"))?;

        match outcome.status {
            CommandStatus::Exited => Ok((outcome.succeeded, outcome.stderr)),
            CommandStatus::ToolMissing { .. } => Err("Git is not installed".to_string()),
            CommandStatus::TimedOut { .. } => Err("Git command timed out".to_string()),
            CommandStatus::Cancelled => Err("Git initialization cancelled".to_string()),
            CommandStatus::LaunchFailed { message } => {
                Err(format!("Git initialization failed: {message}"))
            }
        }
    }

    /// Write the cache file the build script reads plus conventional version files
    async fn write_version_files(&self, issue: &GitVersioningIssue) -> Result<String, String> {
        let short = format!("{}\n", self.short_hash());
        let version = format!("{}\n", self.version);
        let mut created = Vec::new();

        if let Some(cache) = &issue.cache_file_path {
            let path = self.source_dir.join(cache);
            let written = async {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(&path, &short).await
            }
            .await;
            match written {
                Ok(()) => created.push(cache.clone()),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "cache file not written"),
            }
        }

        for (name, contents) in [
            ("VERSION", &version),
            (".version", &version),
            ("version.txt", &version),
            (".git-commit-id", &short),
            ("GIT_COMMIT_ID", &short),
        ] {
            if write_if_absent(&self.source_dir.join(name), contents).await {
                created.push(name.to_string());
            }
        }

        if created.is_empty() {
            Err("Failed to create version files".to_string())
        } else {
            Ok(format!("Created version files: {}", created.join(", ")))
        }
    }

    /// Write `cmake_version_cache.cmake` with the git variables pre-set
    async fn write_cmake_cache(&self) -> Result<String, String> {
        let short = self.short_hash();
        let version = &self.version;
        let content = format!(
            "# Generated by srcforge for tarball builds\n\
             # This file provides version information normally obtained from git\n\n\
             set(GIT_COMMIT_ID \"{short}\" CACHE STRING \"Git commit ID (tarball build)\")\n\
             set(GIT_COMMIT_HASH \"{full}\" CACHE STRING \"Git commit hash (tarball build)\")\n\
             set(GIT_COMMIT \"{short}\" CACHE STRING \"Git commit (tarball build)\")\n\
             set(GIT_VERSION \"{version}\" CACHE STRING \"Git version (tarball build)\")\n\
             set(GIT_TAG \"v{version}\" CACHE STRING \"Git tag (tarball build)\")\n\
             set(GIT_DESCRIBE \"v{version}\" CACHE STRING \"Git describe (tarball build)\")\n\
             set(GIT_BRANCH \"tarball\" CACHE STRING \"Git branch (tarball build)\")\n\
             set(VERSION \"{version}\" CACHE STRING \"Version (tarball build)\")\n\
             set(PROJECT_VERSION \"{version}\" CACHE STRING \"Project version (tarball build)\")\n",
            full = self.commit_hash,
        );

        fs::write(self.source_dir.join(CMAKE_CACHE_FILE), content)
            .await
            .map(|()| format!("Created CMake cache file: {CMAKE_CACHE_FILE}"))
            .map_err(|e| format!("Failed to create CMake cache: {e}"))
    }

    async fn write_generic_files(&self) -> Result<String, String> {
        let version = format!("{}\n", self.version);
        let short = format!("{}\n", self.short_hash());
        let mut created = Vec::new();

        for (name, contents) in [
            ("VERSION", &version),
            ("version.txt", &version),
            (".version", &version),
            ("GIT_VERSION", &short),
        ] {
            if write_if_absent(&self.source_dir.join(name), contents).await {
                created.push(name);
            }
        }

        if created.is_empty() {
            Err("No generic fixes applied".to_string())
        } else {
            Ok(format!("Created version files: {}", created.join(", ")))
        }
    }

    /// Extra CMake arguments that pre-set the git variables
    ///
    /// Includes `-C<cache>` when the generated cache file exists.
    pub async fn cmake_extra_args(&self) -> Vec<String> {
        let short = self.short_hash();
        let mut args = vec![
            format!("-DGIT_COMMIT_ID={short}"),
            format!("-DGIT_COMMIT_HASH={short}"),
            format!("-DGIT_VERSION={}", self.version),
            format!("-DGIT_TAG=v{}", self.version),
            format!("-DGIT_DESCRIBE=v{}", self.version),
        ];

        let cache = self.source_dir.join(CMAKE_CACHE_FILE);
        if fs::try_exists(&cache).await.unwrap_or(false) {
            let absolute = fs::canonicalize(&cache).await.unwrap_or(cache);
            args.insert(0, format!("-C{}", absolute.display()));
        }
        args
    }
}

/// Create `path` with `contents` unless it already exists
async fn write_if_absent(path: &Path, contents: &str) -> bool {
    let result: io::Result<()> = async {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await
    }
    .await;

    match result {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "version file not written");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CancelToken;

    fn fixer(dir: &Path, archive: &str) -> GitVersioningFixer {
        let runners = RunnerFactory::new("test", None, CancelToken::new(), Some(30));
        GitVersioningFixer::new(dir, archive, runners)
    }

    fn cache_issue(path: Option<&str>) -> GitVersioningIssue {
        GitVersioningIssue {
            kind: VersioningIssueKind::CacheFile,
            description: String::new(),
            cmake_file: None,
            cache_file_path: path.map(str::to_string),
            fix_description: String::new(),
        }
    }

    #[test]
    fn test_version_and_hash_from_archive_name() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixer(dir.path(), "widget-2.4.1.tar.gz");
        assert_eq!(f.version(), "2.4.1");
        assert_eq!(f.short_hash().len(), 7);
        assert!(f.commit_hash().starts_with(f.short_hash()));
    }

    #[tokio::test]
    async fn test_version_files_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("VERSION"), "9.9.9\n").unwrap();
        let f = fixer(dir.path(), "widget-2.4.1.tar.gz");

        let message = f
            .write_version_files(&cache_issue(Some("build/.commit")))
            .await
            .unwrap();
        assert!(message.starts_with("Created version files: build/.commit"));
        assert!(!message.contains("VERSION,"));

        assert_eq!(
            std::fs::read_to_string(dir.path().join("VERSION")).unwrap(),
            "9.9.9\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("version.txt")).unwrap(),
            "2.4.1\n"
        );
        let cache = std::fs::read_to_string(dir.path().join("build/.commit")).unwrap();
        assert_eq!(cache.trim(), f.short_hash());
    }

    #[tokio::test]
    async fn test_generic_fix_reports_nothing_when_all_exist() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["VERSION", "version.txt", ".version", "GIT_VERSION"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let f = fixer(dir.path(), "widget-1.0.tar.gz");
        assert_eq!(
            f.write_generic_files().await.unwrap_err(),
            "No generic fixes applied"
        );
    }

    #[tokio::test]
    async fn test_cmake_extra_args() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixer(dir.path(), "widget-1.2.0.tar.gz");

        let args = f.cmake_extra_args().await;
        assert_eq!(args.len(), 5);
        assert_eq!(args[2], "-DGIT_VERSION=1.2.0");
        assert_eq!(args[3], "-DGIT_TAG=v1.2.0");

        f.write_cmake_cache().await.unwrap();
        let args = f.cmake_extra_args().await;
        assert_eq!(args.len(), 6);
        assert!(args[0].starts_with("-C"));
        assert!(args[0].ends_with(CMAKE_CACHE_FILE));

        let cache = std::fs::read_to_string(dir.path().join(CMAKE_CACHE_FILE)).unwrap();
        assert!(cache.contains("set(GIT_BRANCH \"tarball\""));
        assert!(cache.contains(&format!("set(GIT_COMMIT_HASH \"{}\"", f.commit_hash())));
    }

    #[tokio::test]
    async fn test_apply_fixes_without_issues() {
        let dir = tempfile::tempdir().unwrap();
        let report = fixer(dir.path(), "widget-1.0.tar.gz").apply_fixes().await;
        assert!(report.success);
        assert_eq!(report.message, "No git versioning issues to fix");
    }

    #[tokio::test]
    async fn test_apply_fixes_generic_issue() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fixer(dir.path(), "widget-1.0.tar.gz");
        f.ensure_generic_issue();

        // Succeeds through the file fixes whether or not git is installed
        let report = f.apply_fixes().await;
        assert!(report.success);
        assert!(report.message.starts_with("Applied fixes: "));
        assert!(dir.path().join("GIT_VERSION").exists());
    }
}
