//! Pipeline stage state machine

use serde::{Deserialize, Serialize};

/// Stage of a build pipeline run
///
/// Stages advance in declaration order. `DependencyResolution`, `Testing` and
/// `DesktopIntegration` are optional and may be skipped. `Failed` and
/// `Cancelled` are reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Extraction,
    Detection,
    Configuration,
    DependencyResolution,
    Compilation,
    Testing,
    Installation,
    DesktopIntegration,
    Complete,
    Failed,
    Cancelled,
}

impl BuildStage {
    /// The sequential stages, excluding the two failure states
    pub const SEQUENCE: [Self; 9] = [
        Self::Extraction,
        Self::Detection,
        Self::Configuration,
        Self::DependencyResolution,
        Self::Compilation,
        Self::Testing,
        Self::Installation,
        Self::DesktopIntegration,
        Self::Complete,
    ];

    /// Whether no further transition is possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Stages that may be passed over without being entered
    #[must_use]
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            Self::DependencyResolution | Self::Testing | Self::DesktopIntegration
        )
    }

    fn position(self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|stage| *stage == self)
    }

    /// Check whether the pipeline may move from `self` to `next`
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Self::Failed | Self::Cancelled) {
            return true;
        }

        match (self, next) {
            // configure ⇄ dependency resolution, and rerunning either stage
            (Self::DependencyResolution | Self::Configuration, Self::Configuration)
            | (Self::Compilation, Self::Compilation) => return true,
            _ => {}
        }

        let (Some(from), Some(to)) = (self.position(), next.position()) else {
            return false;
        };
        if to <= from {
            return false;
        }
        Self::SEQUENCE[from + 1..to]
            .iter()
            .all(|skipped| skipped.is_optional())
    }

    /// Identifier used in logs and summary records
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Detection => "detection",
            Self::Configuration => "configuration",
            Self::DependencyResolution => "dependency_resolution",
            Self::Compilation => "compilation",
            Self::Testing => "testing",
            Self::Installation => "installation",
            Self::DesktopIntegration => "desktop_integration",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
