//! Post-install discovery of the installed executables

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tokio::io::AsyncReadExt;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// One executable found under the install prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFile {
    pub path: PathBuf,
    pub is_elf: bool,
    /// File name contains the project name
    pub is_main_binary: bool,
}

fn version_suffix() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[-_]?\d+\..*$").ok())
        .as_ref()
}

/// Project name from a source directory name, without its version suffix
///
/// `foo-1.0` becomes `foo` and `libbar_2.3.1` becomes `libbar`.
#[must_use]
pub fn project_name_from_source(source_dir: &Path) -> String {
    let base = source_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match version_suffix() {
        Some(re) => re.replace(&base, "").into_owned(),
        None => base,
    }
}

/// Executables in `<prefix>/bin`, sorted by path
///
/// Returns the files and the main executable: the first file whose name
/// contains `project_name`, otherwise the first file found.
pub(crate) async fn scan_installed_executables(
    prefix: &Path,
    project_name: &str,
) -> (Vec<InstalledFile>, Option<PathBuf>) {
    let bin_dir = prefix.join("bin");
    let Ok(mut entries) = fs::read_dir(&bin_dir).await else {
        return (Vec::new(), None);
    };

    let mut paths = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if is_executable_file(&path).await {
            paths.push(path);
        }
    }
    paths.sort();

    let needle = project_name.to_lowercase();
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let is_main_binary = !needle.is_empty()
            && path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().to_lowercase().contains(&needle));
        files.push(InstalledFile {
            is_elf: has_elf_magic(&path).await,
            is_main_binary,
            path,
        });
    }

    let main = files
        .iter()
        .find(|f| f.is_main_binary)
        .or_else(|| files.first())
        .map(|f| f.path.clone());
    (files, main)
}

async fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path).await else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

async fn has_elf_magic(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path).await else {
        return false;
    };
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).await.is_ok() && &magic == ELF_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_name_strips_version() {
        assert_eq!(project_name_from_source(Path::new("/tmp/x/foo-1.0")), "foo");
        assert_eq!(project_name_from_source(Path::new("libbar_2.3.1")), "libbar");
        assert_eq!(project_name_from_source(Path::new("plain")), "plain");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_prefers_project_binary() {
        use std::os::unix::fs::PermissionsExt;

        let prefix = tempfile::tempdir().unwrap();
        let bin = prefix.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        for (name, content) in [
            ("aaa-helper", b"#!/bin/sh\n".as_slice()),
            ("foo", b"\x7fELF\x02\x01\x01".as_slice()),
        ] {
            let path = bin.join(name);
            std::fs::write(&path, content).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        std::fs::write(bin.join("README"), "not executable").unwrap();

        let (files, main) = scan_installed_executables(prefix.path(), "foo").await;
        assert_eq!(files.len(), 2);
        assert!(!files[0].is_elf);
        assert!(files[1].is_elf && files[1].is_main_binary);
        assert_eq!(main, Some(bin.join("foo")));
    }

    #[tokio::test]
    async fn test_scan_missing_bin_dir() {
        let prefix = tempfile::tempdir().unwrap();
        let (files, main) = scan_installed_executables(prefix.path(), "foo").await;
        assert!(files.is_empty());
        assert_eq!(main, None);
    }
}
