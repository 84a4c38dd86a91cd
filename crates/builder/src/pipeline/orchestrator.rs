//! Stage-by-stage driver for one pipeline run
//!
//! The orchestrator owns the [`PipelineState`] and advances it one stage at a
//! time. Three failures leave the run resumable instead of failing it: no
//! build system detected (bind one with
//! [`BuildOrchestrator::force_build_system`]), a missing build tool, and
//! missing dependencies (install them with
//! [`BuildOrchestrator::install_dependencies`]). Calling
//! [`BuildOrchestrator::run`] again continues from the stage that stopped.

use super::verify::scan_installed_executables;
use super::{BuildSummary, InstallTarget, PipelineState};
use crate::archive::extract_archive;
use crate::build_systems::{detect_build_system, BuildSystem, ConfigOption};
use crate::dependencies::{
    partition_installable, DependencyInfo, DependencyResolver, InstallFailureKind,
    PackageManager, SystemPackageManager,
};
use crate::process::{CancelToken, CommandOutcome, CommandStatus, RunnerFactory};
use crate::utils::text::tail;
use crate::versioning::{is_git_versioning_error, FixReport, GitVersioningFixer};
use chrono::Utc;
use srcforge_config::{calculate_build_jobs, Config};
use srcforge_errors::{BuildError, Error, ProcessError};
use srcforge_events::{BuildEvent, EventEmitter, EventSender};
use srcforge_types::{BuildStage, BuildSystemKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;

/// Error output carried in stage failure messages
const FAILURE_DETAIL_CHARS: usize = 2_000;
const TEST_FAILURE_DETAIL_CHARS: usize = 500;

/// Drives an archive through extraction, configure, build, test and install
pub struct BuildOrchestrator {
    config: Config,
    state: PipelineState,
    runners: RunnerFactory,
    resolver: DependencyResolver,
    package_manager: Arc<dyn PackageManager>,
    versioning: Option<GitVersioningFixer>,
    dependency_rounds: u32,
}

impl std::fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("session_id", &self.state.session_id)
            .field("stage", &self.state.stage())
            .finish_non_exhaustive()
    }
}

impl EventEmitter for BuildOrchestrator {
    fn event_sender(&self) -> Option<&EventSender> {
        self.runners.event_sender()
    }
}

impl BuildOrchestrator {
    /// New run for `archive_path` with a fresh session id
    #[must_use]
    pub fn new(config: Config, archive_path: impl Into<PathBuf>, events: Option<EventSender>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let target = InstallTarget::from_location(config.build.install_location);
        let runners = RunnerFactory::new(
            session_id.clone(),
            events.clone(),
            CancelToken::new(),
            config.build.command_timeout_secs,
        );
        let resolver =
            DependencyResolver::new().with_ignored_names(config.dependencies.extra_ignored_names.clone());
        let package_manager: Arc<dyn PackageManager> =
            Arc::new(SystemPackageManager::new(&config.dependencies, runners.clone()));

        Self {
            state: PipelineState::new(session_id, archive_path, target, events),
            config,
            runners,
            resolver,
            package_manager,
            versioning: None,
            dependency_rounds: 0,
        }
    }

    /// Replace the package manager used for availability checks and installs
    #[must_use]
    pub fn with_package_manager(mut self, package_manager: Arc<dyn PackageManager>) -> Self {
        self.package_manager = package_manager;
        self
    }

    #[must_use]
    pub fn with_install_target(mut self, target: InstallTarget) -> Self {
        self.state.target = target;
        self
    }

    /// Raw configure arguments appended to the configure command
    #[must_use]
    pub fn with_selected_options(mut self, options: Vec<String>) -> Self {
        self.state.selected_options = options;
        self
    }

    #[must_use]
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Mutable access between stages, e.g. to select options or dependencies
    pub fn state_mut(&mut self) -> &mut PipelineState {
        &mut self.state
    }

    /// Token that cancels the run from another task
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.runners.cancel_token().clone()
    }

    /// Request cancellation; the running command is terminated
    pub fn abort(&self) {
        self.runners.cancel_token().cancel();
    }

    /// Advance until the run completes or stops
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the run. Recoverable errors
    /// (`NoBuildSystemDetected`, `ToolMissing`, `DependencyFailure`,
    /// `DependencyInstallFailed`) leave the pipeline in its current stage;
    /// `Error::Cancelled` means the run was cancelled and its extracted tree
    /// removed; anything else moves the pipeline to `Failed`.
    pub async fn run(&mut self) -> Result<BuildSummary, Error> {
        self.advance_until(BuildStage::Complete).await?;
        Ok(self.state.summary())
    }

    /// Extract and detect, stopping before configuration
    ///
    /// # Errors
    ///
    /// Same classification as [`BuildOrchestrator::run`].
    pub async fn detect(&mut self) -> Result<BuildSystemKind, Error> {
        self.advance_until(BuildStage::Configuration).await?;
        self.bound().map(BuildSystem::kind)
    }

    /// Bind `kind` without running its detection check
    ///
    /// Extracts the archive first if that has not happened yet.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction fails or a different build system is
    /// already bound.
    pub async fn force_build_system(&mut self, kind: BuildSystemKind) -> Result<(), Error> {
        if self.state.stage() == BuildStage::Extraction {
            if let Err(e) = self.extract().await {
                return Err(self.stop(e).await);
            }
        }
        let source = self.state.source_dir_or_err()?.to_path_buf();
        self.state
            .bind_build_system(BuildSystem::for_kind(kind, &source), true)
    }

    /// Query the bound build system for its configuration options
    ///
    /// # Errors
    ///
    /// Returns an error if no build system is bound or the help command could
    /// not be supervised.
    pub async fn discover_options(&mut self) -> Result<&[ConfigOption], Error> {
        let build_system = self.bound()?.clone();
        build_system.prepare().await?;
        let help = build_system.help_output(&self.runners).await?;
        self.state.config_options = build_system.parse_config_options(&help);
        tracing::debug!(count = self.state.config_options.len(), "discovered configuration options");
        Ok(&self.state.config_options)
    }

    /// Install the dependencies marked `selected_for_install`
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if the install was cancelled and
    /// `BuildError::DependencyInstallFailed` if the package manager failed.
    pub async fn install_dependencies(&mut self) -> Result<Vec<String>, Error> {
        let packages: Vec<String> = self
            .state
            .dependencies
            .iter()
            .filter(|d| d.selected_for_install && d.is_installable())
            .filter_map(|d| d.package.clone())
            .collect();
        if packages.is_empty() {
            return Ok(packages);
        }
        match self.install_packages(packages.clone()).await {
            Ok(()) => Ok(packages),
            Err(e) => Err(self.stop(e).await),
        }
    }

    /// Remove the extracted tree
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub async fn cleanup(&mut self) -> Result<(), Error> {
        if let Some(dir) = self.state.extract_dir.take() {
            if fs::try_exists(&dir).await.unwrap_or(false) {
                fs::remove_dir_all(&dir)
                    .await
                    .map_err(|e| Error::io_with_path(&e, &dir))?;
                tracing::debug!(dir = %dir.display(), "removed extracted tree");
            }
        }
        Ok(())
    }

    async fn advance_until(&mut self, target: BuildStage) -> Result<(), Error> {
        while self.state.stage() != target {
            if let Err(e) = self.step().await {
                return Err(self.stop(e).await);
            }
        }
        Ok(())
    }

    /// Classify an error that stopped the run
    async fn stop(&mut self, error: Error) -> Error {
        if error.is_cancelled() || self.runners.cancel_token().is_cancelled() {
            if let Err(e) = self.cleanup().await {
                tracing::warn!(error = %e, "failed to remove extracted tree after cancellation");
            }
            self.state.cancel();
            return Error::Cancelled;
        }

        if is_recoverable(&error) {
            tracing::info!(stage = %self.state.stage(), error = %error, "pipeline paused");
            return error;
        }

        tracing::error!(stage = %self.state.stage(), error = %error, "pipeline failed");
        self.state.fail(&error);
        error
    }

    async fn step(&mut self) -> Result<(), Error> {
        if self.runners.cancel_token().is_cancelled() {
            return Err(Error::Cancelled);
        }

        match self.state.stage() {
            BuildStage::Extraction => self.extract().await,
            BuildStage::Detection => self.detect_stage().await,
            BuildStage::Configuration | BuildStage::DependencyResolution => {
                self.configure().await?;
                self.state.transition(BuildStage::Compilation)
            }
            BuildStage::Compilation => {
                self.compile().await?;
                let next = if self.config.build.run_tests {
                    BuildStage::Testing
                } else {
                    BuildStage::Installation
                };
                self.state.transition(next)
            }
            BuildStage::Testing => {
                self.test().await?;
                self.state.transition(BuildStage::Installation)
            }
            BuildStage::Installation => {
                self.install().await?;
                self.state.transition(BuildStage::DesktopIntegration)
            }
            BuildStage::DesktopIntegration => self.complete(),
            stage @ (BuildStage::Complete | BuildStage::Failed | BuildStage::Cancelled) => Err(
                Error::internal(format!("pipeline already finished ({stage})")),
            ),
        }
    }

    fn bound(&self) -> Result<&BuildSystem, Error> {
        self.state
            .build_system()
            .ok_or_else(|| BuildError::BuildSystemNotBound.into())
    }

    async fn run_command(&mut self, argv: &[String], cwd: &Path) -> Result<CommandOutcome, Error> {
        let outcome = self.runners.runner().run(argv, cwd, None).await?;
        self.state.append_output(&outcome);
        Ok(outcome)
    }

    async fn extract(&mut self) -> Result<(), Error> {
        self.emit_build(BuildEvent::SessionStarted {
            session_id: self.state.session_id.clone(),
            archive: self.state.archive_path.clone(),
            install_prefix: self.state.target.prefix.clone(),
        });

        let extracted = extract_archive(&self.state.archive_path, &self.config.work_dir()).await?;
        self.emit_build(BuildEvent::Extracted {
            session_id: self.state.session_id.clone(),
            source_dir: extracted.source_dir.clone(),
        });
        tracing::info!(
            archive = %self.state.archive_path.display(),
            format = %extracted.format,
            source = %extracted.source_dir.display(),
            "archive extracted"
        );
        self.state
            .set_source_dir(extracted.extract_dir, extracted.source_dir);

        if self.runners.cancel_token().is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.state.transition(BuildStage::Detection)
    }

    async fn detect_stage(&mut self) -> Result<(), Error> {
        if self.state.build_system().is_none() {
            let source = self.state.source_dir_or_err()?.to_path_buf();
            let build_system = detect_build_system(&source).await?;
            tracing::info!(build_system = build_system.name(), "build system detected");
            self.state.bind_build_system(build_system, false)?;
        }
        self.state.transition(BuildStage::Configuration)
    }

    /// Configure, looping through versioning fixes and dependency installs
    async fn configure(&mut self) -> Result<(), Error> {
        loop {
            if self.state.stage() != BuildStage::Configuration {
                self.state.transition(BuildStage::Configuration)?;
            }

            let build_system = self.bound()?.clone();
            build_system.prepare().await?;
            let mut command = build_system.configure_command(&self.state.build_context());
            if command.is_empty() {
                tracing::debug!(build_system = build_system.name(), "no configure step");
                return Ok(());
            }
            if command[0].contains("cmake") {
                if let Some(fixer) = &self.versioning {
                    command.extend(fixer.cmake_extra_args().await);
                }
            }

            let outcome = self.run_command(&command, build_system.source_dir()).await?;
            if outcome.succeeded {
                return Ok(());
            }
            check_interrupted(&outcome)?;

            let output = outcome.combined_output();
            let versioning_error = is_git_versioning_error(&output);
            if versioning_error
                && self.config.build.auto_fix_versioning
                && !self.state.git_fix_attempted
            {
                self.state.git_fix_attempted = true;
                self.state.versioning_fix_runs += 1;
                let report = self.fix_versioning(&output).await?;
                if report.success {
                    self.emit_build(BuildEvent::Retrying {
                        session_id: self.state.session_id.clone(),
                        stage: BuildStage::Configuration,
                        reason: report.message,
                    });
                    continue;
                }
                self.emit_warning(report.message);
            }

            let dependencies = self.resolver.parse(&output);
            if dependencies.is_empty() {
                let detail = tail(outcome.error_text().trim(), FAILURE_DETAIL_CHARS).to_string();
                return Err(if versioning_error {
                    BuildError::VersioningFailure { message: detail }
                } else {
                    BuildError::ConfigureFailed { message: detail }
                }
                .into());
            }
            self.resolve_dependencies(dependencies).await?;
        }
    }

    async fn fix_versioning(&mut self, output: &str) -> Result<FixReport, Error> {
        let source = self.state.source_dir_or_err()?.to_path_buf();
        let archive_name = self
            .state
            .archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut fixer = GitVersioningFixer::new(source, &archive_name, self.runners.clone());
        fixer.detect_issues(output).await;
        fixer.ensure_generic_issue();
        self.state.versioning_issues = fixer.issues().to_vec();
        self.emit_build(BuildEvent::VersioningIssuesDetected {
            session_id: self.state.session_id.clone(),
            issues: fixer
                .issues()
                .iter()
                .map(|issue| format!("{}: {}", issue.description, issue.fix_description))
                .collect(),
        });

        let report = fixer.apply_fixes().await;
        if self.runners.cancel_token().is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::info!(success = report.success, message = %report.message, "versioning fixes applied");
        self.versioning = Some(fixer);
        Ok(report)
    }

    async fn resolve_dependencies(&mut self, mut dependencies: Vec<DependencyInfo>) -> Result<(), Error> {
        self.state.transition(BuildStage::DependencyResolution)?;

        if self.config.dependencies.check_availability {
            for dependency in &mut dependencies {
                if !dependency.is_installable() {
                    continue;
                }
                if let Some(package) = dependency.package.clone() {
                    if !self.package_manager.is_available(&package).await {
                        dependency.not_in_repos = true;
                    }
                }
            }
        }
        for dependency in &mut dependencies {
            dependency.selected_for_install = dependency.is_installable();
        }

        let (installable, manual) = partition_installable(&dependencies);
        let packages: Vec<String> = installable
            .iter()
            .filter_map(|d| d.package.clone())
            .collect();
        let unavailable: Vec<String> = manual.iter().map(|d| d.name.clone()).collect();
        let listing = dependencies
            .iter()
            .map(|d| d.package.clone().unwrap_or_else(|| d.name.clone()))
            .collect::<Vec<_>>()
            .join(", ");

        self.emit_build(BuildEvent::DependenciesDetected {
            session_id: self.state.session_id.clone(),
            packages: packages.clone(),
            unavailable,
        });
        self.state.dependencies = dependencies;

        let rounds_left = self.dependency_rounds < self.config.build.max_dependency_rounds;
        if !self.config.dependencies.auto_install || packages.is_empty() || !rounds_left {
            return Err(BuildError::DependencyFailure { packages: listing }.into());
        }
        self.install_packages(packages).await
    }

    async fn install_packages(&mut self, packages: Vec<String>) -> Result<(), Error> {
        self.dependency_rounds += 1;
        tracing::info!(packages = ?packages, round = self.dependency_rounds, "installing dependencies");
        self.package_manager
            .install(&packages)
            .await
            .map_err(|failure| match failure.kind {
                InstallFailureKind::Cancelled => Error::Cancelled,
                _ => BuildError::DependencyInstallFailed {
                    message: failure.message,
                }
                .into(),
            })?;

        let count = packages.len();
        self.emit_build(BuildEvent::DependenciesInstalled {
            session_id: self.state.session_id.clone(),
            packages,
        });
        self.emit_build(BuildEvent::Retrying {
            session_id: self.state.session_id.clone(),
            stage: BuildStage::Configuration,
            reason: format!("installed {count} dependency packages"),
        });
        Ok(())
    }

    /// Compile, retrying once with a single job when a parallel build fails
    async fn compile(&mut self) -> Result<(), Error> {
        let build_system = self.bound()?.clone();
        let ctx = self.state.build_context();
        let mut jobs = calculate_build_jobs(self.config.build.build_jobs);
        let started = Instant::now();

        loop {
            let command = build_system.build_command(&ctx, jobs);
            let outcome = self.run_command(&command, build_system.work_dir()).await?;
            if outcome.succeeded {
                self.state.compile_duration = Some(started.elapsed());
                return Ok(());
            }
            check_interrupted(&outcome)?;

            if jobs > 1 && self.config.build.retry_single_job {
                jobs = 1;
                self.emit_build(BuildEvent::Retrying {
                    session_id: self.state.session_id.clone(),
                    stage: BuildStage::Compilation,
                    reason: "parallel build failed, retrying with a single job".to_string(),
                });
                self.state.transition(BuildStage::Compilation)?;
                continue;
            }

            let mut message = tail(outcome.error_text().trim(), FAILURE_DETAIL_CHARS).to_string();
            let missing = self.resolver.parse(&outcome.combined_output());
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|d| d.name.as_str()).collect();
                message.push_str(&format!("\n\nPossibly missing: {}", names.join(", ")));
                self.state.dependencies = missing;
            }
            return Err(BuildError::CompilationFailed { message }.into());
        }
    }

    /// Run the test suite; failures are reported but never stop the run
    async fn test(&mut self) -> Result<(), Error> {
        let build_system = self.bound()?.clone();
        let Some(command) = build_system.test_command().await else {
            self.emit_notice("No automated tests were detected");
            return Ok(());
        };

        let outcome = self.run_command(&command, build_system.work_dir()).await?;
        if outcome.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let passed = outcome.succeeded;
        if !passed {
            self.emit_warning_with_context(
                "Tests failed, continuing with installation",
                tail(outcome.error_text().trim(), TEST_FAILURE_DETAIL_CHARS),
            );
        }
        self.state.tests_passed = Some(passed);
        self.emit_build(BuildEvent::TestsFinished {
            session_id: self.state.session_id.clone(),
            passed,
        });
        Ok(())
    }

    async fn install(&mut self) -> Result<(), Error> {
        let build_system = self.bound()?.clone();
        let command = build_system.install_command(&self.state.build_context());
        let outcome = self.run_command(&command, build_system.work_dir()).await?;
        if !outcome.succeeded {
            check_interrupted(&outcome)?;
            return Err(BuildError::InstallFailed {
                message: tail(outcome.error_text().trim(), FAILURE_DETAIL_CHARS).to_string(),
            }
            .into());
        }

        let (files, main) =
            scan_installed_executables(&self.state.target.prefix, &self.state.project_name).await;
        tracing::info!(executables = files.len(), main = ?main, "installation verified");
        self.state.installed_files = files;
        self.state.main_executable = main;
        Ok(())
    }

    fn complete(&mut self) -> Result<(), Error> {
        self.state.transition(BuildStage::Complete)?;
        let end = Utc::now();
        self.state.end_time = Some(end);
        let duration = (end - self.state.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.emit_build(BuildEvent::Completed {
            session_id: self.state.session_id.clone(),
            install_prefix: self.state.target.prefix.clone(),
            main_executable: self.state.main_executable.clone(),
            duration,
        });
        Ok(())
    }
}

/// Errors after which the run can continue from the same stage
fn is_recoverable(error: &Error) -> bool {
    matches!(
        error,
        Error::Build(
            BuildError::NoBuildSystemDetected { .. }
                | BuildError::ToolMissing { .. }
                | BuildError::DependencyFailure { .. }
                | BuildError::DependencyInstallFailed { .. }
        )
    )
}

/// Map a command that did not get to exit on its own to an error
fn check_interrupted(outcome: &CommandOutcome) -> Result<(), Error> {
    match &outcome.status {
        CommandStatus::Exited => Ok(()),
        CommandStatus::Cancelled => Err(Error::Cancelled),
        CommandStatus::ToolMissing { tool, hint } => Err(BuildError::ToolMissing {
            tool: tool.clone(),
            hint: hint.clone(),
        }
        .into()),
        CommandStatus::TimedOut { seconds } => Err(BuildError::Timeout { seconds: *seconds }.into()),
        CommandStatus::LaunchFailed { message } => Err(ProcessError::ExecutionFailed {
            command: String::new(),
            message: message.clone(),
        }
        .into()),
    }
}
