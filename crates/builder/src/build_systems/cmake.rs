//! `CMake` build system implementation

use super::{is_file, BuildSystemContext};
use crate::process::RunnerFactory;
use srcforge_errors::{BuildError, Error};
use std::path::{Path, PathBuf};
use tokio::fs;

const BUILD_DIR_NAME: &str = "build";
const CACHE_POPULATE_TIMEOUT_SECS: u64 = 60;
const CACHE_LIST_TIMEOUT_SECS: u64 = 30;

/// `CMake` build system with an out-of-source `build/` directory
#[derive(Debug, Clone)]
pub struct CMakeBuildSystem {
    pub(super) source_dir: PathBuf,
    pub(super) build_dir: PathBuf,
}

impl CMakeBuildSystem {
    #[must_use]
    pub fn new(source_dir: PathBuf) -> Self {
        let build_dir = source_dir.join(BUILD_DIR_NAME);
        Self {
            source_dir,
            build_dir,
        }
    }

    pub async fn detect(source_dir: &Path) -> bool {
        is_file(&source_dir.join("CMakeLists.txt")).await
    }

    pub(super) async fn prepare(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.build_dir)
            .await
            .map_err(|e| BuildError::ConfigureFailed {
                message: format!(
                    "failed to create build directory {}: {e}",
                    self.build_dir.display()
                ),
            })?;
        Ok(())
    }

    pub(super) fn configure_command(&self, ctx: &BuildSystemContext) -> Vec<String> {
        let mut cmd = vec![
            "cmake".to_string(),
            format!("-DCMAKE_INSTALL_PREFIX={}", ctx.prefix.display()),
            "-S".to_string(),
            self.source_dir.display().to_string(),
            "-B".to_string(),
            self.build_dir.display().to_string(),
        ];
        cmd.extend(ctx.options.iter().cloned());
        cmd
    }

    pub(super) fn build_command(&self, jobs: usize) -> Vec<String> {
        vec![
            "cmake".to_string(),
            "--build".to_string(),
            self.build_dir.display().to_string(),
            "-j".to_string(),
            jobs.to_string(),
        ]
    }

    pub(super) fn install_command(&self) -> Vec<String> {
        vec![
            "cmake".to_string(),
            "--install".to_string(),
            self.build_dir.display().to_string(),
        ]
    }

    /// `ctest` when configure generated a CTest manifest
    pub(super) async fn test_command(&self) -> Option<Vec<String>> {
        let manifest = self.build_dir.join("CTestTestfile.cmake");
        if fs::try_exists(&manifest).await.unwrap_or(false) {
            Some(vec![
                "ctest".to_string(),
                "--test-dir".to_string(),
                self.build_dir.display().to_string(),
            ])
        } else {
            None
        }
    }

    /// Populate the cache once, then list its non-advanced entries
    pub(super) async fn help_output(&self, runners: &RunnerFactory) -> Result<String, Error> {
        self.prepare().await?;

        let build_dir = self.build_dir.display().to_string();
        let populate = vec![
            "cmake".to_string(),
            "-S".to_string(),
            self.source_dir.display().to_string(),
            "-B".to_string(),
            build_dir.clone(),
        ];
        let outcome = runners
            .runner_with_timeout(CACHE_POPULATE_TIMEOUT_SECS)
            .run(&populate, &self.source_dir, None)
            .await?;
        if outcome.is_cancelled() || outcome.is_tool_missing() {
            return Ok(outcome.stderr);
        }

        let list = vec![
            "cmake".to_string(),
            "-L".to_string(),
            "-N".to_string(),
            "-B".to_string(),
            build_dir,
        ];
        let outcome = runners
            .runner_with_timeout(CACHE_LIST_TIMEOUT_SECS)
            .run(&list, &self.source_dir, None)
            .await?;
        Ok(outcome.stdout)
    }
}
