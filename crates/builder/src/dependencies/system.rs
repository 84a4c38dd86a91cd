//! System package manager integration

use crate::process::{CommandOutcome, CommandStatus, RunnerFactory};
use crate::utils::text::truncate_chars;
use async_trait::async_trait;
use srcforge_config::DependencyConfig;
use std::fmt;
use std::path::PathBuf;

const AVAILABILITY_TIMEOUT_SECS: u64 = 30;

/// Why a package install did not go through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallFailureKind {
    /// The elevation prompt was dismissed
    AuthCancelled,
    NotAuthorized,
    PackageNotFound,
    Cancelled,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallFailure {
    pub kind: InstallFailureKind,
    pub message: String,
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl InstallFailure {
    /// Classify a failed install command
    #[must_use]
    pub fn from_outcome(outcome: &CommandOutcome) -> Self {
        if outcome.is_cancelled() {
            return Self {
                kind: InstallFailureKind::Cancelled,
                message: "Installation cancelled".to_string(),
            };
        }
        if let CommandStatus::ToolMissing { tool, .. } = &outcome.status {
            return Self {
                kind: InstallFailureKind::Other,
                message: format!("{tool} is not installed"),
            };
        }

        let output = format!("{}{}", outcome.stderr, outcome.stdout).to_lowercase();
        let (kind, message) = if outcome.exit_code == 126 || outcome.exit_code == 127 {
            (
                InstallFailureKind::AuthCancelled,
                "Authentication cancelled or failed".to_string(),
            )
        } else if output.contains("not authorized") || output.contains("authorization") {
            (
                InstallFailureKind::NotAuthorized,
                "Not authorized to install packages".to_string(),
            )
        } else if output.contains("no package") || output.contains("not found") {
            (
                InstallFailureKind::PackageNotFound,
                "One or more packages were not found in the repositories".to_string(),
            )
        } else {
            let detail = truncate_chars(outcome.error_text().trim(), 500).to_string();
            (InstallFailureKind::Other, format!("Installation failed: {detail}"))
        };
        Self { kind, message }
    }
}

/// Package manager operations the pipeline depends on
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Whether `package` exists in the configured repositories
    ///
    /// Implementations fail open: when the check cannot run, report `true`.
    async fn is_available(&self, package: &str) -> bool;

    /// Install `packages`, prompting for elevation as needed
    async fn install(&self, packages: &[String]) -> Result<(), InstallFailure>;
}

/// Package manager driven through its command line, e.g. `pkexec dnf`
pub struct SystemPackageManager {
    program: String,
    elevation: String,
    runners: RunnerFactory,
}

impl SystemPackageManager {
    #[must_use]
    pub fn new(config: &DependencyConfig, runners: RunnerFactory) -> Self {
        Self {
            program: config.package_manager.clone(),
            elevation: config.elevation.clone(),
            runners,
        }
    }

    /// Full install command line
    #[must_use]
    pub fn install_command(&self, packages: &[String]) -> Vec<String> {
        let mut cmd = Vec::with_capacity(packages.len() + 4);
        if !self.elevation.is_empty() {
            cmd.push(self.elevation.clone());
        }
        cmd.push(self.program.clone());
        cmd.push("install".to_string());
        cmd.push("-y".to_string());
        cmd.extend(packages.iter().cloned());
        cmd
    }
}

#[async_trait]
impl PackageManager for SystemPackageManager {
    async fn is_available(&self, package: &str) -> bool {
        let argv = vec![self.program.clone(), "info".to_string(), package.to_string()];
        let cwd = std::env::temp_dir();
        match self
            .runners
            .runner_with_timeout(AVAILABILITY_TIMEOUT_SECS)
            .run(&argv, &cwd, None)
            .await
        {
            Ok(outcome) if outcome.status == CommandStatus::Exited => outcome.succeeded,
            _ => true,
        }
    }

    async fn install(&self, packages: &[String]) -> Result<(), InstallFailure> {
        if packages.is_empty() {
            return Ok(());
        }
        let argv = self.install_command(packages);
        let cwd: PathBuf = std::env::temp_dir();
        let outcome = self
            .runners
            .runner()
            .run(&argv, &cwd, None)
            .await
            .map_err(|e| InstallFailure {
                kind: InstallFailureKind::Other,
                message: e.to_string(),
            })?;

        if outcome.succeeded {
            Ok(())
        } else {
            Err(InstallFailure::from_outcome(&outcome))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CancelToken;
    use std::time::Duration;

    fn outcome(exit_code: i32, stderr: &str) -> CommandOutcome {
        CommandOutcome {
            succeeded: false,
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            status: CommandStatus::Exited,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            InstallFailure::from_outcome(&outcome(126, "")).kind,
            InstallFailureKind::AuthCancelled
        );
        assert_eq!(
            InstallFailure::from_outcome(&outcome(1, "Error: Not authorized")).kind,
            InstallFailureKind::NotAuthorized
        );
        assert_eq!(
            InstallFailure::from_outcome(&outcome(1, "No match for argument: foo-devel\nError: Unable to find a match: no package foo")).kind,
            InstallFailureKind::PackageNotFound
        );
        let other = InstallFailure::from_outcome(&outcome(1, &"x".repeat(900)));
        assert_eq!(other.kind, InstallFailureKind::Other);
        assert!(other.message.len() < 600);
    }

    #[test]
    fn test_install_command_line() {
        let runners = RunnerFactory::new("t", None, CancelToken::new(), None);
        let pm = SystemPackageManager::new(&DependencyConfig::default(), runners);
        assert_eq!(
            pm.install_command(&["zlib-devel".to_string()]),
            vec!["pkexec", "dnf", "install", "-y", "zlib-devel"]
        );
    }

    #[tokio::test]
    async fn test_availability_fails_open_without_package_manager() {
        let runners = RunnerFactory::new("t", None, CancelToken::new(), None);
        let config = DependencyConfig {
            package_manager: "srcforge-no-such-pm".to_string(),
            ..DependencyConfig::default()
        };
        let pm = SystemPackageManager::new(&config, runners);
        assert!(pm.is_available("zlib-devel").await);
    }
}
