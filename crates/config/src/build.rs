//! Pipeline and dependency handling settings

use serde::{Deserialize, Serialize};
use srcforge_types::InstallLocation;

use crate::constants::{
    DEFAULT_ELEVATION_COMMAND, DEFAULT_MAX_DEPENDENCY_ROUNDS, DEFAULT_PACKAGE_MANAGER,
};

/// Build pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub build_jobs: usize, // 0 = auto-detect
    #[serde(default = "default_true")]
    pub run_tests: bool,
    #[serde(default)]
    pub install_location: InstallLocation,
    /// Patch and retry when configure fails on missing git metadata
    #[serde(default = "default_true")]
    pub auto_fix_versioning: bool,
    /// Rerun a failed parallel compile with a single job
    #[serde(default = "default_true")]
    pub retry_single_job: bool,
    /// Install-and-reconfigure rounds before giving up on dependencies
    #[serde(default = "default_max_dependency_rounds")]
    pub max_dependency_rounds: u32,
    /// Per-command timeout, unbounded if unset
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_jobs: 0,
            run_tests: true,
            install_location: InstallLocation::UserLocal,
            auto_fix_versioning: true,
            retry_single_job: true,
            max_dependency_rounds: DEFAULT_MAX_DEPENDENCY_ROUNDS,
            command_timeout_secs: None,
        }
    }
}

/// System package manager integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
    /// Privilege elevation wrapper for package installs
    #[serde(default = "default_elevation")]
    pub elevation: String,
    /// Query the package manager before offering a package
    #[serde(default = "default_true")]
    pub check_availability: bool,
    /// Install detected packages without asking
    #[serde(default)]
    pub auto_install: bool,
    /// Additional names never reported as missing dependencies
    #[serde(default)]
    pub extra_ignored_names: Vec<String>,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            package_manager: default_package_manager(),
            elevation: default_elevation(),
            check_availability: true,
            auto_install: false,
            extra_ignored_names: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_dependency_rounds() -> u32 {
    DEFAULT_MAX_DEPENDENCY_ROUNDS
}

fn default_package_manager() -> String {
    DEFAULT_PACKAGE_MANAGER.to_string()
}

fn default_elevation() -> String {
    DEFAULT_ELEVATION_COMMAND.to_string()
}
