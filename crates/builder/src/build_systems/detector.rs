//! Build system detection in fixed priority order

use super::BuildSystem;
use srcforge_errors::{BuildError, Error};
use srcforge_types::BuildSystemKind;
use std::path::Path;

/// Detect the build system of `source_dir`
///
/// Variants are tried in [`BuildSystemKind::DETECTION_ORDER`] and the first
/// match wins.
///
/// # Errors
///
/// Returns `BuildError::NoBuildSystemDetected` when no variant matches; the
/// caller can still bind one with [`BuildSystem::for_kind`].
pub async fn detect_build_system(source_dir: &Path) -> Result<BuildSystem, Error> {
    for kind in BuildSystemKind::DETECTION_ORDER {
        if BuildSystem::detects(kind, source_dir).await {
            tracing::debug!(%kind, dir = %source_dir.display(), "build system detected");
            return Ok(BuildSystem::for_kind(kind, source_dir));
        }
    }

    Err(BuildError::NoBuildSystemDetected {
        path: source_dir.display().to_string(),
    }
    .into())
}
