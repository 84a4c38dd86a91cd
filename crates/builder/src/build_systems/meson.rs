//! Meson build system implementation

use super::{is_file, BuildSystemContext};
use crate::process::RunnerFactory;
use srcforge_errors::Error;
use std::path::{Path, PathBuf};

const BUILD_DIR_NAME: &str = "builddir";
const HELP_TIMEOUT_SECS: u64 = 30;

/// Meson build system driving ninja in `builddir/`
#[derive(Debug, Clone)]
pub struct MesonBuildSystem {
    pub(super) source_dir: PathBuf,
    pub(super) build_dir: PathBuf,
}

impl MesonBuildSystem {
    #[must_use]
    pub fn new(source_dir: PathBuf) -> Self {
        let build_dir = source_dir.join(BUILD_DIR_NAME);
        Self {
            source_dir,
            build_dir,
        }
    }

    pub async fn detect(source_dir: &Path) -> bool {
        is_file(&source_dir.join("meson.build")).await
    }

    pub(super) fn configure_command(&self, ctx: &BuildSystemContext) -> Vec<String> {
        let mut cmd = vec![
            "meson".to_string(),
            "setup".to_string(),
            format!("--prefix={}", ctx.prefix.display()),
            self.build_dir.display().to_string(),
            self.source_dir.display().to_string(),
        ];
        cmd.extend(ctx.options.iter().cloned());
        cmd
    }

    pub(super) fn build_command(&self, jobs: usize) -> Vec<String> {
        vec![
            "ninja".to_string(),
            "-C".to_string(),
            self.build_dir.display().to_string(),
            "-j".to_string(),
            jobs.to_string(),
        ]
    }

    pub(super) fn install_command(&self) -> Vec<String> {
        vec![
            "ninja".to_string(),
            "-C".to_string(),
            self.build_dir.display().to_string(),
            "install".to_string(),
        ]
    }

    pub(super) fn test_command(&self) -> Vec<String> {
        vec![
            "meson".to_string(),
            "test".to_string(),
            "-C".to_string(),
            self.build_dir.display().to_string(),
        ]
    }

    pub(super) async fn help_output(&self, runners: &RunnerFactory) -> Result<String, Error> {
        let argv = vec![
            "meson".to_string(),
            "configure".to_string(),
            self.source_dir.display().to_string(),
        ];
        let outcome = runners
            .runner_with_timeout(HELP_TIMEOUT_SECS)
            .run(&argv, &self.source_dir, None)
            .await?;
        Ok(outcome.stdout)
    }
}
