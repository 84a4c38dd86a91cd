#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]
//! Source archive build orchestration for srcforge
//!
//! This crate takes a source archive from extraction to an installed
//! program: it detects the build tooling, configures it, resolves missing
//! build dependencies, works around archives that expect git metadata,
//! compiles, tests and installs, streaming every command's output as events.

mod archive;
mod build_systems;
mod dependencies;
mod pipeline;
mod process;
mod utils;
mod versioning;

pub use archive::{extract_archive, ArchiveFormat, ExtractedArchive};
pub use build_systems::{
    detect_build_system, AutotoolsBuildSystem, BuildSystem, BuildSystemContext, CMakeBuildSystem,
    ConfigOption, MakefileBuildSystem, MesonBuildSystem,
};
pub use dependencies::{
    map_dependency_to_package, partition_installable, DependencyInfo, DependencyResolver,
    InstallFailure, InstallFailureKind, PackageManager, SystemPackageManager, UnpackagedLibrary,
    UNPACKAGED_LIBRARIES,
};
pub use pipeline::{
    project_name_from_source, BuildOrchestrator, BuildSummary, InstallTarget, InstalledFile,
    PipelineState,
};
pub use process::{
    parse_progress, CancelToken, CommandOutcome, CommandStatus, ProcessRunner, ProgressHint,
    RunnerFactory, CANCELLED_EXIT_CODE,
};
pub use utils::timeout::{with_optional_timeout, with_timeout};
pub use versioning::{
    detect_issues, extract_version, is_git_versioning_error, FixReport, GitVersioningFixer,
    GitVersioningIssue, VersioningIssueKind, CMAKE_CACHE_FILE, DEFAULT_VERSION,
};
