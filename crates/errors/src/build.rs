//! Build pipeline error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum BuildError {
    #[error("extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("unsupported archive format: {format}")]
    UnsupportedArchiveFormat { format: String },

    #[error("archive is empty: {path}")]
    EmptyArchive { path: String },

    #[error("no build system detected in {path}")]
    NoBuildSystemDetected { path: String },

    #[error("unknown build system: {name}")]
    UnknownBuildSystem { name: String },

    #[error("no build system bound to the pipeline")]
    BuildSystemNotBound,

    #[error("required build tool not installed: {tool}")]
    ToolMissing { tool: String, hint: Option<String> },

    #[error("configure failed: {message}")]
    ConfigureFailed { message: String },

    #[error("missing build dependencies: {packages}")]
    DependencyFailure { packages: String },

    #[error("dependency installation failed: {message}")]
    DependencyInstallFailed { message: String },

    #[error("build expects version control metadata: {message}")]
    VersioningFailure { message: String },

    #[error("compilation failed: {message}")]
    CompilationFailed { message: String },

    #[error("install failed: {message}")]
    InstallFailed { message: String },

    #[error("invalid stage transition from {from} to {to}")]
    InvalidStageTransition { from: String, to: String },

    #[error("build timeout after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl UserFacingError for BuildError {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Self::ToolMissing {
                tool,
                hint: Some(hint),
            } => Cow::Owned(format!("required build tool not installed: {tool} ({hint})")),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ExtractionFailed { .. } | Self::EmptyArchive { .. } => {
                Some("Check that the archive is a complete, readable source tarball.")
            }
            Self::UnsupportedArchiveFormat { .. } => {
                Some("Use a .tar.gz, .tgz, .tar.bz2, .tar.xz, .tar or .zip archive.")
            }
            Self::NoBuildSystemDetected { .. } | Self::UnknownBuildSystem { .. } => Some(
                "Select a build system manually with --build-system (autotools, cmake, meson, make).",
            ),
            Self::ToolMissing { .. } => {
                Some("Install the missing build tool and run the stage again.")
            }
            Self::DependencyFailure { .. } => Some(
                "Install the listed development packages, or rerun with --install-deps.",
            ),
            Self::DependencyInstallFailed { .. } => {
                Some("Install the packages manually with your system package manager.")
            }
            Self::VersioningFailure { .. } => Some(
                "Build from a git clone, or a release tarball that ships version information.",
            ),
            Self::CompilationFailed { .. } => {
                Some("Retry with a single job (--jobs 1) to rule out parallel build races.")
            }
            Self::InstallFailed { .. } => {
                Some("Check write permissions for the install prefix.")
            }
            Self::Timeout { .. } => Some("Increase the command timeout, then retry."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ToolMissing { .. }
                | Self::DependencyFailure { .. }
                | Self::CompilationFailed { .. }
                | Self::Timeout { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ExtractionFailed { .. } => "build.extraction_failed",
            Self::UnsupportedArchiveFormat { .. } => "build.unsupported_archive_format",
            Self::EmptyArchive { .. } => "build.empty_archive",
            Self::NoBuildSystemDetected { .. } => "build.no_build_system_detected",
            Self::UnknownBuildSystem { .. } => "build.unknown_build_system",
            Self::BuildSystemNotBound => "build.build_system_not_bound",
            Self::ToolMissing { .. } => "build.tool_missing",
            Self::ConfigureFailed { .. } => "build.configure_failed",
            Self::DependencyFailure { .. } => "build.dependency_failure",
            Self::DependencyInstallFailed { .. } => "build.dependency_install_failed",
            Self::VersioningFailure { .. } => "build.versioning_failure",
            Self::CompilationFailed { .. } => "build.compilation_failed",
            Self::InstallFailed { .. } => "build.install_failed",
            Self::InvalidStageTransition { .. } => "build.invalid_stage_transition",
            Self::Timeout { .. } => "build.timeout",
        };
        Some(code)
    }
}
