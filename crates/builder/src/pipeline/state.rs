//! Session record threaded through every pipeline stage

use super::{InstallTarget, InstalledFile};
use crate::build_systems::{BuildSystem, BuildSystemContext, ConfigOption};
use crate::dependencies::DependencyInfo;
use crate::process::CommandOutcome;
use crate::utils::text::tail;
use crate::versioning::GitVersioningIssue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use srcforge_errors::{BuildError, Error, UserFacingError};
use srcforge_events::{BuildEvent, EventEmitter, EventSender, FailureContext};
use srcforge_types::{BuildStage, InstallLocation};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SUMMARY_STDOUT_CHARS: usize = 10_000;
const SUMMARY_STDERR_CHARS: usize = 5_000;
/// Captured error output kept when the pipeline fails
const FAILURE_OUTPUT_CHARS: usize = 2_000;

/// Mutable state of one pipeline run
///
/// Stage fields are private so every change goes through
/// [`PipelineState::transition`], which enforces the stage graph and emits
/// [`BuildEvent::StageChanged`].
#[derive(Debug)]
pub struct PipelineState {
    pub session_id: String,
    pub archive_path: PathBuf,
    pub project_name: String,
    /// Directory created for this run; removed on cancellation
    pub extract_dir: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub target: InstallTarget,
    build_system: Option<BuildSystem>,
    build_system_forced: bool,
    pub config_options: Vec<ConfigOption>,
    /// Raw configure arguments chosen by the user
    pub selected_options: Vec<String>,
    pub dependencies: Vec<DependencyInfo>,
    pub versioning_issues: Vec<GitVersioningIssue>,
    /// Automatic versioning fix already tried in the current configuration
    /// attempt; re-armed when dependency resolution hands back to configure
    pub git_fix_attempted: bool,
    /// Versioning fix runs over the whole session
    pub versioning_fix_runs: u32,
    pub installed_files: Vec<InstalledFile>,
    pub main_executable: Option<PathBuf>,
    /// `None` when no test suite ran
    pub tests_passed: Option<bool>,
    pub compile_duration: Option<Duration>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    full_stdout: String,
    full_stderr: String,
    stage: BuildStage,
    error_stage: Option<BuildStage>,
    error_message: Option<String>,
    event_sender: Option<EventSender>,
}

impl EventEmitter for PipelineState {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl PipelineState {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        archive_path: impl Into<PathBuf>,
        target: InstallTarget,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            archive_path: archive_path.into(),
            project_name: String::new(),
            extract_dir: None,
            source_dir: None,
            target,
            build_system: None,
            build_system_forced: false,
            config_options: Vec::new(),
            selected_options: Vec::new(),
            dependencies: Vec::new(),
            versioning_issues: Vec::new(),
            git_fix_attempted: false,
            versioning_fix_runs: 0,
            installed_files: Vec::new(),
            main_executable: None,
            tests_passed: None,
            compile_duration: None,
            start_time: Utc::now(),
            end_time: None,
            full_stdout: String::new(),
            full_stderr: String::new(),
            stage: BuildStage::Extraction,
            error_stage: None,
            error_message: None,
            event_sender,
        }
    }

    #[must_use]
    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    /// Stage that was active when the run failed
    #[must_use]
    pub fn error_stage(&self) -> Option<BuildStage> {
        self.error_stage
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    #[must_use]
    pub fn build_system(&self) -> Option<&BuildSystem> {
        self.build_system.as_ref()
    }

    #[must_use]
    pub fn build_system_forced(&self) -> bool {
        self.build_system_forced
    }

    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.full_stdout
    }

    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.full_stderr
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// Returns `BuildError::InvalidStageTransition` if the stage graph does
    /// not allow the move.
    pub fn transition(&mut self, next: BuildStage) -> Result<(), Error> {
        if !self.stage.can_transition_to(next) {
            return Err(BuildError::InvalidStageTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        let from = self.stage;
        self.stage = next;
        if from == BuildStage::DependencyResolution && next == BuildStage::Configuration {
            self.git_fix_attempted = false;
        }
        tracing::debug!(session = %self.session_id, %from, to = %next, "stage changed");
        self.emit_build(BuildEvent::StageChanged {
            session_id: self.session_id.clone(),
            from,
            to: next,
        });
        Ok(())
    }

    /// Enter `Failed`, recording the current stage and a tail of the error output
    pub fn fail(&mut self, error: &Error) {
        if self.stage.is_terminal() {
            return;
        }
        let stage = self.stage;
        let captured = tail(self.full_stderr.trim_end(), FAILURE_OUTPUT_CHARS);
        let message = if captured.is_empty() {
            error.user_message().into_owned()
        } else {
            format!("{}\n\n{captured}", error.user_message())
        };
        self.error_stage = Some(stage);
        self.error_message = Some(message);
        self.end_time = Some(Utc::now());

        if self.transition(BuildStage::Failed).is_ok() {
            self.emit_build(BuildEvent::Failed {
                session_id: self.session_id.clone(),
                stage,
                failure: FailureContext::from_error(error),
            });
        }
    }

    /// Enter `Cancelled`
    pub fn cancel(&mut self) {
        if self.stage.is_terminal() {
            return;
        }
        self.end_time = Some(Utc::now());
        if self.transition(BuildStage::Cancelled).is_ok() {
            self.emit_build(BuildEvent::Cancelled {
                session_id: self.session_id.clone(),
            });
        }
    }

    /// Bind the build system for this run
    ///
    /// Rebinding the same kind replaces the instance; a different kind is
    /// refused once one is bound.
    ///
    /// # Errors
    ///
    /// Returns an error if a build system of another kind is already bound.
    pub fn bind_build_system(&mut self, build_system: BuildSystem, forced: bool) -> Result<(), Error> {
        if let Some(existing) = &self.build_system {
            if existing.kind() != build_system.kind() {
                return Err(Error::internal(format!(
                    "build system already bound as {}, cannot switch to {}",
                    existing.name(),
                    build_system.name()
                )));
            }
        }
        self.emit_build(BuildEvent::BuildSystemDetected {
            session_id: self.session_id.clone(),
            kind: build_system.kind(),
            forced,
        });
        self.build_system = Some(build_system);
        self.build_system_forced = forced;
        Ok(())
    }

    /// Record the source tree produced by extraction
    pub fn set_source_dir(&mut self, extract_dir: PathBuf, source_dir: PathBuf) {
        self.project_name = super::project_name_from_source(&source_dir);
        self.extract_dir = Some(extract_dir);
        self.source_dir = Some(source_dir);
    }

    /// Append a finished command's output to the session transcript
    pub fn append_output(&mut self, outcome: &CommandOutcome) {
        self.full_stdout.push_str(&outcome.stdout);
        self.full_stderr.push_str(&outcome.stderr);
    }

    /// Arguments shared by every command of the bound build system
    #[must_use]
    pub fn build_context(&self) -> BuildSystemContext {
        let mut options = self.selected_options.clone();
        options.extend(
            self.config_options
                .iter()
                .filter(|o| o.selected)
                .map(ConfigOption::to_arg),
        );
        BuildSystemContext {
            prefix: self.target.prefix.clone(),
            elevation: self.target.elevation.clone(),
            options,
        }
    }

    /// Flat record of the run for logging and display
    #[must_use]
    pub fn summary(&self) -> BuildSummary {
        BuildSummary {
            session_id: self.session_id.clone(),
            project_name: self.project_name.clone(),
            archive: self.archive_path.clone(),
            source_dir: self.source_dir.clone(),
            build_system: self.build_system.as_ref().map(|bs| bs.name().to_string()),
            build_system_forced: self.build_system_forced,
            install_prefix: self.target.prefix.clone(),
            install_location: self.target.location,
            stage: self.stage,
            error_stage: self.error_stage,
            error_message: self.error_message.clone(),
            main_executable: self.main_executable.clone(),
            installed_files: self.installed_files.clone(),
            tests_passed: self.tests_passed,
            dependencies: self.dependencies.clone(),
            versioning_fix_runs: self.versioning_fix_runs,
            started_at: self.start_time,
            finished_at: self.end_time,
            compile_seconds: self.compile_duration.map(|d| d.as_secs_f64()),
            stdout_tail: tail(&self.full_stdout, SUMMARY_STDOUT_CHARS).to_string(),
            stderr_tail: tail(&self.full_stderr, SUMMARY_STDERR_CHARS).to_string(),
        }
    }

    pub(crate) fn source_dir_or_err(&self) -> Result<&Path, Error> {
        self.source_dir
            .as_deref()
            .ok_or_else(|| Error::internal("archive has not been extracted"))
    }
}

/// Outcome record of one run
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub session_id: String,
    pub project_name: String,
    pub archive: PathBuf,
    pub source_dir: Option<PathBuf>,
    pub build_system: Option<String>,
    pub build_system_forced: bool,
    pub install_prefix: PathBuf,
    pub install_location: InstallLocation,
    pub stage: BuildStage,
    pub error_stage: Option<BuildStage>,
    pub error_message: Option<String>,
    pub main_executable: Option<PathBuf>,
    pub installed_files: Vec<InstalledFile>,
    pub tests_passed: Option<bool>,
    pub dependencies: Vec<DependencyInfo>,
    pub versioning_fix_runs: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub compile_seconds: Option<f64>,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

impl BuildSummary {
    /// Wall time of the run, if it has finished
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.finished_at
            .and_then(|end| (end - self.started_at).to_std().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandStatus;
    use srcforge_types::BuildSystemKind;

    fn state() -> PipelineState {
        PipelineState::new(
            "s1",
            "/tmp/foo-1.0.tar.gz",
            InstallTarget::with_prefix("/opt/foo", InstallLocation::UserLocal),
            None,
        )
    }

    fn outcome(stdout: &str, stderr: &str) -> CommandOutcome {
        CommandOutcome {
            succeeded: false,
            exit_code: 1,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            status: CommandStatus::Exited,
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_transitions_are_validated() {
        let mut s = state();
        s.transition(BuildStage::Detection).unwrap();
        assert!(s.transition(BuildStage::Compilation).is_err());
        s.transition(BuildStage::Configuration).unwrap();
        s.transition(BuildStage::DependencyResolution).unwrap();
        s.transition(BuildStage::Configuration).unwrap();
        s.transition(BuildStage::Compilation).unwrap();
        s.transition(BuildStage::Compilation).unwrap();
        assert_eq!(s.stage(), BuildStage::Compilation);
    }

    #[tokio::test]
    async fn test_stage_changes_are_emitted() {
        let (tx, mut rx) = srcforge_events::channel();
        let mut s = PipelineState::new(
            "s2",
            "/tmp/a.tar",
            InstallTarget::with_prefix("/opt", InstallLocation::UserLocal),
            Some(tx),
        );
        s.transition(BuildStage::Detection).unwrap();
        match rx.recv().await.unwrap() {
            srcforge_events::AppEvent::Build(BuildEvent::StageChanged { from, to, .. }) => {
                assert_eq!(from, BuildStage::Extraction);
                assert_eq!(to, BuildStage::Detection);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_fail_records_stage_and_output_tail() {
        let mut s = state();
        s.transition(BuildStage::Detection).unwrap();
        s.transition(BuildStage::Configuration).unwrap();
        s.append_output(&outcome("checking...\n", "configure: error: no C compiler\n"));

        let err: Error = BuildError::ConfigureFailed {
            message: "exit 1".to_string(),
        }
        .into();
        s.fail(&err);

        assert_eq!(s.stage(), BuildStage::Failed);
        assert_eq!(s.error_stage(), Some(BuildStage::Configuration));
        assert!(s.error_message().unwrap().contains("no C compiler"));
        assert!(s.end_time.is_some());

        // Terminal: a second failure changes nothing
        s.fail(&Error::Cancelled);
        assert_eq!(s.error_stage(), Some(BuildStage::Configuration));
    }

    #[test]
    fn test_build_system_cannot_change_kind() {
        let mut s = state();
        let dir = Path::new("/src/foo");
        s.bind_build_system(BuildSystem::for_kind(BuildSystemKind::CMake, dir), false)
            .unwrap();
        assert!(s
            .bind_build_system(BuildSystem::for_kind(BuildSystemKind::Meson, dir), true)
            .is_err());
        assert!(s
            .bind_build_system(BuildSystem::for_kind(BuildSystemKind::CMake, dir), true)
            .is_ok());
        assert_eq!(s.build_system().map(BuildSystem::kind), Some(BuildSystemKind::CMake));
    }

    #[test]
    fn test_dependency_round_rearms_versioning_fix() {
        let mut s = state();
        s.transition(BuildStage::Detection).unwrap();
        s.transition(BuildStage::Configuration).unwrap();
        s.git_fix_attempted = true;
        s.transition(BuildStage::DependencyResolution).unwrap();
        assert!(s.git_fix_attempted);
        s.transition(BuildStage::Configuration).unwrap();
        assert!(!s.git_fix_attempted);
    }

    #[test]
    fn test_build_context_collects_options() {
        let mut s = state();
        s.selected_options.push("--disable-nls".to_string());
        s.config_options.push(ConfigOption {
            name: "-DBUILD_TESTING".to_string(),
            description: String::new(),
            is_feature: true,
            default_enabled: true,
            value: Some("ON".to_string()),
            selected: true,
        });
        let ctx = s.build_context();
        assert_eq!(ctx.prefix, PathBuf::from("/opt/foo"));
        assert_eq!(ctx.options, vec!["--disable-nls", "-DBUILD_TESTING=OFF"]);
        assert_eq!(ctx.elevation, None);
    }

    #[test]
    fn test_summary_tails_output() {
        let mut s = state();
        s.append_output(&outcome(&"x".repeat(12_000), "err"));
        let summary = s.summary();
        assert_eq!(summary.stdout_tail.len(), SUMMARY_STDOUT_CHARS);
        assert_eq!(summary.stderr_tail, "err");
        assert_eq!(summary.stage, BuildStage::Extraction);
        assert!(summary.elapsed().is_none());
    }
}
