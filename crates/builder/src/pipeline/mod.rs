//! Pipeline session record and the orchestrator that drives it

mod orchestrator;
mod state;
mod verify;

pub use orchestrator::BuildOrchestrator;
pub use state::{BuildSummary, PipelineState};
pub use verify::{project_name_from_source, InstalledFile};

use serde::{Deserialize, Serialize};
use srcforge_types::InstallLocation;
use std::path::PathBuf;

/// Privilege wrapper used for system-wide install commands
pub const SYSTEM_ELEVATION_COMMAND: &str = "sudo";

/// Where and how the build gets installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallTarget {
    pub prefix: PathBuf,
    pub location: InstallLocation,
    /// Wrapper prepended to install commands
    pub elevation: Option<String>,
}

impl InstallTarget {
    /// Standard prefix for `location`
    #[must_use]
    pub fn from_location(location: InstallLocation) -> Self {
        Self::with_prefix(location.prefix(), location)
    }

    /// Custom prefix, elevated when `location` requires it
    #[must_use]
    pub fn with_prefix(prefix: impl Into<PathBuf>, location: InstallLocation) -> Self {
        Self {
            prefix: prefix.into(),
            location,
            elevation: location
                .requires_elevation()
                .then(|| SYSTEM_ELEVATION_COMMAND.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_target_elevation() {
        let user = InstallTarget::from_location(InstallLocation::UserLocal);
        assert!(user.prefix.ends_with(".local"));
        assert_eq!(user.elevation, None);

        let system = InstallTarget::from_location(InstallLocation::SystemWide);
        assert_eq!(system.prefix, PathBuf::from("/usr/local"));
        assert_eq!(system.elevation.as_deref(), Some("sudo"));
    }
}
