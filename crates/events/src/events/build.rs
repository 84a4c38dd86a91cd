use serde::{Deserialize, Serialize};
use srcforge_types::{BuildStage, BuildSystemKind};
use std::path::PathBuf;
use std::time::Duration;

use super::FailureContext;

/// Build pipeline events
///
/// Every variant carries the `session_id` of the pipeline run that produced it
/// so a single receiver can follow several runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuildEvent {
    /// Pipeline run started for an archive
    SessionStarted {
        session_id: String,
        archive: PathBuf,
        install_prefix: PathBuf,
    },

    /// Pipeline moved to a new stage
    StageChanged {
        session_id: String,
        from: BuildStage,
        to: BuildStage,
    },

    /// Archive unpacked
    Extracted {
        session_id: String,
        source_dir: PathBuf,
    },

    /// Build system chosen for the source tree
    BuildSystemDetected {
        session_id: String,
        kind: BuildSystemKind,
        forced: bool,
    },

    /// External command spawned
    CommandStarted {
        session_id: String,
        command: String,
        working_dir: PathBuf,
    },

    /// One line of command output
    StepOutput {
        session_id: String,
        line: String,
        is_stderr: bool,
    },

    /// Progress hint parsed from build output
    Progress {
        session_id: String,
        current: Option<u64>,
        total: Option<u64>,
        activity: Option<String>,
    },

    /// External command exited
    CommandCompleted {
        session_id: String,
        command: String,
        exit_code: i32,
        duration: Duration,
    },

    /// External command was stopped by a cancellation request
    CommandCancelled { session_id: String, command: String },

    /// Required build tool is not installed
    ToolMissing {
        session_id: String,
        tool: String,
        hint: Option<String>,
    },

    /// Configure failed on missing libraries or tools
    DependenciesDetected {
        session_id: String,
        packages: Vec<String>,
        unavailable: Vec<String>,
    },

    /// Dependency packages were handed to the package manager
    DependenciesInstalled {
        session_id: String,
        packages: Vec<String>,
    },

    /// Configure failed on missing git metadata
    VersioningIssuesDetected {
        session_id: String,
        issues: Vec<String>,
    },

    /// Step message from the versioning fixer
    VersioningFixProgress { session_id: String, message: String },

    /// Stage rerun with different parameters
    Retrying {
        session_id: String,
        stage: BuildStage,
        reason: String,
    },

    /// Test suite finished; failures never abort the pipeline
    TestsFinished { session_id: String, passed: bool },

    /// Build installed and verified
    Completed {
        session_id: String,
        install_prefix: PathBuf,
        main_executable: Option<PathBuf>,
        duration: Duration,
    },

    /// Pipeline failed
    Failed {
        session_id: String,
        stage: BuildStage,
        failure: FailureContext,
    },

    /// Pipeline cancelled and working files removed
    Cancelled { session_id: String },
}

impl BuildEvent {
    /// Session the event belongs to
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::StageChanged { session_id, .. }
            | Self::Extracted { session_id, .. }
            | Self::BuildSystemDetected { session_id, .. }
            | Self::CommandStarted { session_id, .. }
            | Self::StepOutput { session_id, .. }
            | Self::Progress { session_id, .. }
            | Self::CommandCompleted { session_id, .. }
            | Self::CommandCancelled { session_id, .. }
            | Self::ToolMissing { session_id, .. }
            | Self::DependenciesDetected { session_id, .. }
            | Self::DependenciesInstalled { session_id, .. }
            | Self::VersioningIssuesDetected { session_id, .. }
            | Self::VersioningFixProgress { session_id, .. }
            | Self::Retrying { session_id, .. }
            | Self::TestsFinished { session_id, .. }
            | Self::Completed { session_id, .. }
            | Self::Failed { session_id, .. }
            | Self::Cancelled { session_id } => session_id,
        }
    }
}
