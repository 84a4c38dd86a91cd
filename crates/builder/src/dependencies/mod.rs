//! Missing build dependency detection and package mapping
//!
//! [`DependencyResolver`] turns configure and compiler output into a
//! deduplicated list of [`DependencyInfo`]. Installing the packages goes
//! through a [`PackageManager`], kept behind a trait so the pipeline can be
//! driven without touching the host system.

mod catalog;
mod resolver;
mod system;

pub use catalog::{map_dependency_to_package, UnpackagedLibrary, UNPACKAGED_LIBRARIES};
pub use resolver::DependencyResolver;
pub use system::{InstallFailure, InstallFailureKind, PackageManager, SystemPackageManager};

use serde::{Deserialize, Serialize};

/// One inferred missing dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    /// Name as it appeared in the tool output, cleaned of quoting
    pub name: String,
    /// Distribution package believed to provide it
    pub package: Option<String>,
    pub description: String,
    pub is_header_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_install_url: Option<String>,
    /// Shell recipe for installing by hand
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_install_cmd: Option<String>,
    /// Commands that perform the manual install non-interactively
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_install: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copr_repo: Option<String>,
    /// Not available from the standard repositories
    pub not_in_repos: bool,
    pub selected_for_install: bool,
}

impl DependencyInfo {
    /// Deduplication key: the package, or the raw name when unmapped
    #[must_use]
    pub fn key(&self) -> String {
        self.package
            .as_deref()
            .unwrap_or(&self.name)
            .to_lowercase()
    }

    /// Whether the package manager can install this dependency
    #[must_use]
    pub fn is_installable(&self) -> bool {
        self.package.is_some() && !self.not_in_repos
    }
}

/// Split into package-manager installable and manual-install dependencies
#[must_use]
pub fn partition_installable(
    deps: &[DependencyInfo],
) -> (Vec<&DependencyInfo>, Vec<&DependencyInfo>) {
    deps.iter().partition(|dep| dep.is_installable())
}
