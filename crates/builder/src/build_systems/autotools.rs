//! GNU Autotools build system implementation

use super::{makefile_has_target, BuildSystemContext};
use crate::process::RunnerFactory;
use srcforge_errors::Error;
use std::path::{Path, PathBuf};
use tokio::fs;

const HELP_TIMEOUT_SECS: u64 = 30;

/// GNU Autotools build system, driven through a shipped `configure` script
#[derive(Debug, Clone)]
pub struct AutotoolsBuildSystem {
    pub(super) source_dir: PathBuf,
}

impl AutotoolsBuildSystem {
    #[must_use]
    pub fn new(source_dir: PathBuf) -> Self {
        Self { source_dir }
    }

    /// An executable `configure` script in the source root
    pub async fn detect(source_dir: &Path) -> bool {
        let Ok(metadata) = fs::metadata(source_dir.join("configure")).await else {
            return false;
        };
        if !metadata.is_file() {
            return false;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o111 != 0
        }
        #[cfg(not(unix))]
        {
            true
        }
    }

    pub(super) fn configure_command(&self, ctx: &BuildSystemContext) -> Vec<String> {
        let mut cmd = vec![
            "./configure".to_string(),
            format!("--prefix={}", ctx.prefix.display()),
        ];
        cmd.extend(ctx.options.iter().cloned());
        cmd
    }

    #[allow(clippy::unused_self)]
    pub(super) fn build_command(&self, jobs: usize) -> Vec<String> {
        vec!["make".to_string(), format!("-j{jobs}")]
    }

    #[allow(clippy::unused_self)]
    pub(super) fn install_command(&self) -> Vec<String> {
        vec!["make".to_string(), "install".to_string()]
    }

    /// `make check`, else `make test`, when the generated Makefile has the target
    pub(super) async fn test_command(&self) -> Option<Vec<String>> {
        let makefile = fs::read_to_string(self.source_dir.join("Makefile"))
            .await
            .ok()?;
        ["check", "test"]
            .into_iter()
            .find(|target| makefile_has_target(&makefile, target))
            .map(|target| vec!["make".to_string(), target.to_string()])
    }

    pub(super) async fn help_output(&self, runners: &RunnerFactory) -> Result<String, Error> {
        let argv = vec!["./configure".to_string(), "--help".to_string()];
        let outcome = runners
            .runner_with_timeout(HELP_TIMEOUT_SECS)
            .run(&argv, &self.source_dir, None)
            .await?;
        Ok(outcome.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detect_requires_executable_configure() {
        let dir = tempfile::tempdir().unwrap();
        let configure = dir.path().join("configure");
        std::fs::write(&configure, "#!/bin/sh\n").unwrap();
        assert!(!AutotoolsBuildSystem::detect(dir.path()).await);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&configure, std::fs::Permissions::from_mode(0o755)).unwrap();
            assert!(AutotoolsBuildSystem::detect(dir.path()).await);
        }
    }

    #[tokio::test]
    async fn test_prefers_check_over_test() {
        let dir = tempfile::tempdir().unwrap();
        let bs = AutotoolsBuildSystem::new(dir.path().to_path_buf());
        assert_eq!(bs.test_command().await, None);

        std::fs::write(dir.path().join("Makefile"), "test:\n\ttrue\ncheck: all\n").unwrap();
        assert_eq!(
            bs.test_command().await,
            Some(vec!["make".to_string(), "check".to_string()])
        );
    }

    #[test]
    fn test_configure_command_appends_options() {
        let bs = AutotoolsBuildSystem::new(PathBuf::from("/src/foo"));
        let ctx = BuildSystemContext {
            prefix: PathBuf::from("/usr/local"),
            elevation: None,
            options: vec!["--disable-nls".to_string()],
        };
        assert_eq!(
            bs.configure_command(&ctx),
            vec!["./configure", "--prefix=/usr/local", "--disable-nls"]
        );
        assert_eq!(bs.build_command(4), vec!["make", "-j4"]);
    }
}
