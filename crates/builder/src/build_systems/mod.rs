//! Build system abstraction and implementations
//!
//! The four supported tool families are variants of [`BuildSystem`]. Each
//! variant knows how to detect itself, produce its configure, build, install
//! and test commands, and parse its own option listing.

use serde::{Deserialize, Serialize};
use srcforge_errors::Error;
use srcforge_types::BuildSystemKind;
use std::path::{Path, PathBuf};

use crate::process::RunnerFactory;

mod autotools;
mod cmake;
mod detector;
mod make;
mod meson;
mod options;

pub use autotools::AutotoolsBuildSystem;
pub use cmake::CMakeBuildSystem;
pub use detector::detect_build_system;
pub use make::MakefileBuildSystem;
pub use meson::MesonBuildSystem;

/// One configuration switch discovered from a build system's help output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOption {
    /// Argument stem, e.g. `--enable-nls` or `-DBUILD_TESTING`
    pub name: String,
    pub description: String,
    /// On/off switch as opposed to a value-taking option
    pub is_feature: bool,
    pub default_enabled: bool,
    /// Current value of a value-taking option, e.g. a `CMake` cache entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub selected: bool,
}

impl ConfigOption {
    /// Command-line argument for a selected option
    ///
    /// `CMake` switches flip their default; `CMake` value options are passed
    /// as `-DNAME=VALUE`.
    #[must_use]
    pub fn to_arg(&self) -> String {
        if !self.name.starts_with("-D") || self.name.contains('=') {
            return self.name.clone();
        }
        if self.is_feature {
            let value = if self.default_enabled { "OFF" } else { "ON" };
            format!("{}={value}", self.name)
        } else {
            format!("{}={}", self.name, self.value.as_deref().unwrap_or_default())
        }
    }
}

/// Inputs shared by every command a build system produces
#[derive(Debug, Clone, Default)]
pub struct BuildSystemContext {
    /// Install prefix passed to configure or make
    pub prefix: PathBuf,
    /// Privilege wrapper for install commands, `None` for user-local installs
    pub elevation: Option<String>,
    /// Extra configure arguments chosen by the user
    pub options: Vec<String>,
}

impl BuildSystemContext {
    fn elevated(&self, mut command: Vec<String>) -> Vec<String> {
        if let Some(wrapper) = &self.elevation {
            command.insert(0, wrapper.clone());
        }
        command
    }
}

/// A build system bound to one source tree
#[derive(Debug, Clone)]
pub enum BuildSystem {
    Autotools(AutotoolsBuildSystem),
    CMake(CMakeBuildSystem),
    Meson(MesonBuildSystem),
    PlainMakefile(MakefileBuildSystem),
}

impl BuildSystem {
    /// Bind `kind` to `source_dir` without running its detection check
    #[must_use]
    pub fn for_kind(kind: BuildSystemKind, source_dir: &Path) -> Self {
        let source_dir = source_dir.to_path_buf();
        match kind {
            BuildSystemKind::Autotools => Self::Autotools(AutotoolsBuildSystem::new(source_dir)),
            BuildSystemKind::CMake => Self::CMake(CMakeBuildSystem::new(source_dir)),
            BuildSystemKind::Meson => Self::Meson(MesonBuildSystem::new(source_dir)),
            BuildSystemKind::PlainMakefile => {
                Self::PlainMakefile(MakefileBuildSystem::new(source_dir))
            }
        }
    }

    /// Whether `kind` recognises `source_dir`
    pub async fn detects(kind: BuildSystemKind, source_dir: &Path) -> bool {
        match kind {
            BuildSystemKind::Autotools => AutotoolsBuildSystem::detect(source_dir).await,
            BuildSystemKind::CMake => CMakeBuildSystem::detect(source_dir).await,
            BuildSystemKind::Meson => MesonBuildSystem::detect(source_dir).await,
            BuildSystemKind::PlainMakefile => MakefileBuildSystem::detect(source_dir).await,
        }
    }

    #[must_use]
    pub fn kind(&self) -> BuildSystemKind {
        match self {
            Self::Autotools(_) => BuildSystemKind::Autotools,
            Self::CMake(_) => BuildSystemKind::CMake,
            Self::Meson(_) => BuildSystemKind::Meson,
            Self::PlainMakefile(_) => BuildSystemKind::PlainMakefile,
        }
    }

    /// Human-readable name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind().display_name()
    }

    #[must_use]
    pub fn source_dir(&self) -> &Path {
        match self {
            Self::Autotools(bs) => &bs.source_dir,
            Self::CMake(bs) => &bs.source_dir,
            Self::Meson(bs) => &bs.source_dir,
            Self::PlainMakefile(bs) => &bs.source_dir,
        }
    }

    /// Out-of-tree build directory, if this variant uses one
    #[must_use]
    pub fn build_dir(&self) -> Option<&Path> {
        match self {
            Self::CMake(bs) => Some(&bs.build_dir),
            Self::Meson(bs) => Some(&bs.build_dir),
            Self::Autotools(_) | Self::PlainMakefile(_) => None,
        }
    }

    /// Directory to run build, test and install commands in
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        match self.build_dir() {
            Some(dir) if dir.is_dir() => dir,
            _ => self.source_dir(),
        }
    }

    /// Create anything the configure command expects to exist
    ///
    /// # Errors
    ///
    /// Returns an error if the build directory cannot be created.
    pub async fn prepare(&self) -> Result<(), Error> {
        match self {
            Self::CMake(bs) => bs.prepare().await,
            _ => Ok(()),
        }
    }

    /// Configure command; empty when the variant has no configure step
    #[must_use]
    pub fn configure_command(&self, ctx: &BuildSystemContext) -> Vec<String> {
        match self {
            Self::Autotools(bs) => bs.configure_command(ctx),
            Self::CMake(bs) => bs.configure_command(ctx),
            Self::Meson(bs) => bs.configure_command(ctx),
            Self::PlainMakefile(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn build_command(&self, ctx: &BuildSystemContext, jobs: usize) -> Vec<String> {
        match self {
            Self::Autotools(bs) => bs.build_command(jobs),
            Self::CMake(bs) => bs.build_command(jobs),
            Self::Meson(bs) => bs.build_command(jobs),
            Self::PlainMakefile(bs) => bs.build_command(ctx, jobs),
        }
    }

    #[must_use]
    pub fn install_command(&self, ctx: &BuildSystemContext) -> Vec<String> {
        let command = match self {
            Self::Autotools(bs) => bs.install_command(),
            Self::CMake(bs) => bs.install_command(),
            Self::Meson(bs) => bs.install_command(),
            Self::PlainMakefile(bs) => bs.install_command(ctx),
        };
        ctx.elevated(command)
    }

    /// Test command, if the tree has a test suite this variant can run
    pub async fn test_command(&self) -> Option<Vec<String>> {
        match self {
            Self::Autotools(bs) => bs.test_command().await,
            Self::CMake(bs) => bs.test_command().await,
            Self::Meson(bs) => Some(bs.test_command()),
            Self::PlainMakefile(bs) => bs.test_command().await,
        }
    }

    /// Raw option listing as printed by the build tool
    ///
    /// # Errors
    ///
    /// Returns an error only if a help command could not be supervised.
    pub async fn help_output(&self, runners: &RunnerFactory) -> Result<String, Error> {
        match self {
            Self::Autotools(bs) => bs.help_output(runners).await,
            Self::CMake(bs) => bs.help_output(runners).await,
            Self::Meson(bs) => bs.help_output(runners).await,
            Self::PlainMakefile(_) => Ok(MakefileBuildSystem::help_output().to_string()),
        }
    }

    /// Options parsed from [`BuildSystem::help_output`]
    #[must_use]
    pub fn parse_config_options(&self, help: &str) -> Vec<ConfigOption> {
        match self {
            Self::Autotools(_) => options::parse_autotools_options(help),
            Self::CMake(_) => options::parse_cmake_cache(help),
            Self::Meson(_) | Self::PlainMakefile(_) => Vec::new(),
        }
    }
}

/// Regular file check; directories and dangling links do not count
pub(crate) async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

/// Whether `content` declares `target` as a make rule
pub(crate) fn makefile_has_target(content: &str, target: &str) -> bool {
    content.lines().any(|line| {
        line.strip_prefix(target)
            .is_some_and(|rest| rest.trim_start_matches([' ', '\t']).starts_with(':'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_makefile_target_detection() {
        let makefile = "all: foo\n\ntest :\n\t./run\ncheck-extra: x\n";
        assert!(makefile_has_target(makefile, "test"));
        assert!(makefile_has_target(makefile, "all"));
        assert!(!makefile_has_target(makefile, "check"));
        assert!(!makefile_has_target("\ttest: indented", "test"));
    }

    #[tokio::test]
    async fn test_marker_directories_are_not_detected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("CMakeLists.txt")).unwrap();
        std::fs::create_dir(dir.path().join("meson.build")).unwrap();
        assert!(!BuildSystem::detects(BuildSystemKind::CMake, dir.path()).await);
        assert!(!BuildSystem::detects(BuildSystemKind::Meson, dir.path()).await);

        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("meson.build"), "project('x')").unwrap();
        assert!(BuildSystem::detects(BuildSystemKind::Meson, tree.path()).await);
    }

    #[test]
    fn test_install_is_elevated_only_for_system_installs() {
        let bs = BuildSystem::for_kind(BuildSystemKind::CMake, Path::new("/src/foo"));
        let user = BuildSystemContext {
            prefix: PathBuf::from("/home/u/.local"),
            ..BuildSystemContext::default()
        };
        let system = BuildSystemContext {
            prefix: PathBuf::from("/usr/local"),
            elevation: Some("sudo".to_string()),
            options: Vec::new(),
        };
        assert_eq!(bs.install_command(&user)[0], "cmake");
        assert_eq!(bs.install_command(&system)[..2], ["sudo", "cmake"]);
    }

    #[test]
    fn test_option_to_arg() {
        let feature = ConfigOption {
            name: "-DBUILD_DOCS".to_string(),
            description: String::new(),
            is_feature: true,
            default_enabled: false,
            value: Some("OFF".to_string()),
            selected: true,
        };
        assert_eq!(feature.to_arg(), "-DBUILD_DOCS=ON");

        let build_type = ConfigOption {
            name: "-DCMAKE_BUILD_TYPE".to_string(),
            is_feature: false,
            value: Some("Release".to_string()),
            ..feature.clone()
        };
        assert_eq!(build_type.to_arg(), "-DCMAKE_BUILD_TYPE=Release");

        let unset = ConfigOption {
            value: None,
            ..build_type
        };
        assert_eq!(unset.to_arg(), "-DCMAKE_BUILD_TYPE=");

        let enable = ConfigOption {
            name: "--enable-nls".to_string(),
            ..feature
        };
        assert_eq!(enable.to_arg(), "--enable-nls");
    }
}
