//! Plain Makefile projects without a configure step

use super::{is_file, makefile_has_target, BuildSystemContext};
use std::path::{Path, PathBuf};
use tokio::fs;

const MAKEFILE_NAMES: [&str; 3] = ["Makefile", "makefile", "GNUmakefile"];

#[derive(Debug, Clone)]
pub struct MakefileBuildSystem {
    pub(super) source_dir: PathBuf,
}

impl MakefileBuildSystem {
    #[must_use]
    pub fn new(source_dir: PathBuf) -> Self {
        Self { source_dir }
    }

    /// A Makefile variant exists and no `configure` script does
    pub async fn detect(source_dir: &Path) -> bool {
        if is_file(&source_dir.join("configure")).await {
            return false;
        }
        for name in MAKEFILE_NAMES {
            if is_file(&source_dir.join(name)).await {
                return true;
            }
        }
        false
    }

    #[allow(clippy::unused_self)]
    pub(super) fn build_command(&self, ctx: &BuildSystemContext, jobs: usize) -> Vec<String> {
        vec![
            "make".to_string(),
            format!("-j{jobs}"),
            format!("PREFIX={}", ctx.prefix.display()),
        ]
    }

    #[allow(clippy::unused_self)]
    pub(super) fn install_command(&self, ctx: &BuildSystemContext) -> Vec<String> {
        vec![
            "make".to_string(),
            "install".to_string(),
            format!("PREFIX={}", ctx.prefix.display()),
        ]
    }

    pub(super) async fn test_command(&self) -> Option<Vec<String>> {
        for name in MAKEFILE_NAMES {
            if let Ok(content) = fs::read_to_string(self.source_dir.join(name)).await {
                if makefile_has_target(&content, "test") {
                    return Some(vec!["make".to_string(), "test".to_string()]);
                }
            }
        }
        None
    }

    pub(super) fn help_output() -> &'static str {
        "Plain Makefile detected. Limited configuration options available."
    }
}
