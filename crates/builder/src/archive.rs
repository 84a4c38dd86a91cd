//! Source archive extraction
//!
//! Formats are identified by magic bytes, falling back to the file extension
//! when the header carries no known signature. Gzip and plain tar streams
//! are unpacked directly on a blocking thread; bzip2 and xz are first
//! decompressed to a scratch tarball through `async-compression`.

use async_compression::tokio::bufread::{BzDecoder, XzDecoder};
use flate2::read::GzDecoder;
use srcforge_errors::{BuildError, Error};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive as TarArchive;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::task;

type Result<T> = std::result::Result<T, Error>;

/// Supported archive containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarBz2,
    TarXz,
    Tar,
    Zip,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::TarXz => "tar.xz",
            Self::Tar => "tar",
            Self::Zip => "zip",
        };
        f.write_str(name)
    }
}

impl ArchiveFormat {
    /// Identify the container from the first bytes of the file
    #[must_use]
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        if header.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else if header.starts_with(b"BZh") {
            Some(Self::TarBz2)
        } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Self::TarXz)
        } else if header.starts_with(b"PK\x03\x04") {
            Some(Self::Zip)
        } else if header.len() >= 262 && &header[257..262] == b"ustar" {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Identify the container from the file name
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        [
            (".tar.gz", Self::TarGz),
            (".tgz", Self::TarGz),
            (".tar.bz2", Self::TarBz2),
            (".tbz2", Self::TarBz2),
            (".tar.xz", Self::TarXz),
            (".txz", Self::TarXz),
            (".tar", Self::Tar),
            (".zip", Self::Zip),
        ]
        .into_iter()
        .find_map(|(suffix, format)| name.ends_with(suffix).then_some(format))
    }

    /// Read the header of `path` and identify its format
    ///
    /// Magic bytes decide; the extension is the fallback for headers that
    /// carry no signature. A header of only zero bytes is an empty tarball.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the format is unknown.
    pub async fn detect(path: &Path) -> Result<Self> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| BuildError::ExtractionFailed {
                message: format!("Failed to open archive {}: {e}", path.display()),
            })?;
        let mut header = vec![0u8; 512];
        let mut filled = 0;
        while filled < header.len() {
            let read = file
                .read(&mut header[filled..])
                .await
                .map_err(|e| BuildError::ExtractionFailed {
                    message: format!("Failed to read archive header: {e}"),
                })?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        header.truncate(filled);

        if header.iter().all(|&b| b == 0) {
            return Err(BuildError::EmptyArchive {
                path: path.display().to_string(),
            }
            .into());
        }

        Self::from_magic(&header)
            .or_else(|| Self::from_extension(path))
            .ok_or_else(|| {
                BuildError::UnsupportedArchiveFormat {
                    format: path.file_name().map_or_else(
                        || path.display().to_string(),
                        |n| n.to_string_lossy().into_owned(),
                    ),
                }
                .into()
            })
    }
}

/// Result of unpacking an archive
#[derive(Debug, Clone)]
pub struct ExtractedArchive {
    /// Freshly created directory owning everything that was unpacked
    pub extract_dir: PathBuf,
    /// Top-level project directory inside `extract_dir`
    pub source_dir: PathBuf,
    pub format: ArchiveFormat,
}

/// Extract `archive_path` into a new timestamped directory under `work_root`
///
/// The directory is kept after this call returns; removing it is the
/// caller's responsibility.
///
/// # Errors
///
/// Returns `BuildError::ExtractionFailed` for unreadable or corrupt archives,
/// `BuildError::EmptyArchive` when nothing was unpacked and
/// `BuildError::UnsupportedArchiveFormat` for unknown containers.
pub async fn extract_archive(archive_path: &Path, work_root: &Path) -> Result<ExtractedArchive> {
    let format = ArchiveFormat::detect(archive_path).await?;

    tokio::fs::create_dir_all(work_root)
        .await
        .map_err(|e| BuildError::ExtractionFailed {
            message: format!("Failed to create work directory: {e}"),
        })?;

    let prefix = format!(
        "{}{}-",
        srcforge_config::constants::WORK_DIR_PREFIX,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let extract_dir = tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir_in(work_root)
        .map_err(|e| BuildError::ExtractionFailed {
            message: format!("Failed to create extraction directory: {e}"),
        })?
        .keep();

    let first_entry = match format {
        ArchiveFormat::TarGz => {
            let path = archive_path.to_path_buf();
            let dest = extract_dir.clone();
            blocking(move || unpack_tar(GzDecoder::new(open(&path)?), &dest)).await?
        }
        ArchiveFormat::Tar => {
            let path = archive_path.to_path_buf();
            let dest = extract_dir.clone();
            blocking(move || unpack_tar(open(&path)?, &dest)).await?
        }
        ArchiveFormat::TarBz2 | ArchiveFormat::TarXz => {
            let scratch = decompress_to_scratch(archive_path, work_root, format).await?;
            let dest = extract_dir.clone();
            blocking(move || {
                let result = unpack_tar(open(scratch.path())?, &dest);
                drop(scratch);
                result
            })
            .await?
        }
        ArchiveFormat::Zip => {
            let path = archive_path.to_path_buf();
            let dest = extract_dir.clone();
            blocking(move || unpack_zip(&path, &dest)).await?
        }
    };

    let Some(first_entry) = first_entry else {
        // Leave no empty work directory behind
        let _ = tokio::fs::remove_dir_all(&extract_dir).await;
        return Err(BuildError::EmptyArchive {
            path: archive_path.display().to_string(),
        }
        .into());
    };

    let source_dir = top_level_dir(&first_entry)
        .map(|top| extract_dir.join(top))
        .filter(|candidate| candidate.is_dir())
        .unwrap_or_else(|| extract_dir.clone());

    tracing::debug!(
        archive = %archive_path.display(),
        %format,
        source_dir = %source_dir.display(),
        "extracted archive"
    );

    Ok(ExtractedArchive {
        extract_dir,
        source_dir,
        format,
    })
}

fn top_level_dir(entry: &Path) -> Option<PathBuf> {
    entry.components().find_map(|component| match component {
        Component::Normal(name) => Some(PathBuf::from(name)),
        _ => None,
    })
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| BuildError::ExtractionFailed {
            message: format!("Task join error: {e}"),
        })?
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        BuildError::ExtractionFailed {
            message: format!("Failed to open archive: {e}"),
        }
        .into()
    })
}

/// Unpack every entry, returning the path of the first one
fn unpack_tar<R: Read>(reader: R, dest: &Path) -> Result<Option<PathBuf>> {
    let failed = |e: std::io::Error| -> Error {
        BuildError::ExtractionFailed {
            message: format!("Failed to extract tar: {e}"),
        }
        .into()
    };

    let mut archive = TarArchive::new(reader);
    let mut first = None;
    for entry in archive.entries().map_err(failed)? {
        let mut entry = entry.map_err(failed)?;
        let path = entry.path().map_err(failed)?.into_owned();
        // pax headers and similar metadata never unpack to a path
        let unpacked = entry.unpack_in(dest).map_err(failed)?;
        if unpacked && first.is_none() && top_level_dir(&path).is_some() {
            first = Some(path);
        }
    }
    Ok(first)
}

fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<Option<PathBuf>> {
    let failed = |message: String| -> Error { BuildError::ExtractionFailed { message }.into() };

    let file = open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| failed(format!("Failed to read zip archive: {e}")))?;

    let mut first = None;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| failed(format!("Failed to read zip entry: {e}")))?;

        let Some(relative) = file.enclosed_name() else {
            continue;
        };
        let outpath = dest.join(&relative);
        if first.is_none() {
            first = Some(relative);
        }

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)
                .map_err(|e| failed(format!("Failed to create directory: {e}")))?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| failed(format!("Failed to create parent directory: {e}")))?;
            }
            let mut outfile = File::create(&outpath)
                .map_err(|e| failed(format!("Failed to create file: {e}")))?;
            std::io::copy(&mut file, &mut outfile)
                .map_err(|e| failed(format!("Failed to extract file: {e}")))?;
        }

        // Keep configure scripts executable
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }
    Ok(first)
}

async fn decompress_to_scratch(
    archive_path: &Path,
    work_root: &Path,
    format: ArchiveFormat,
) -> Result<tempfile::NamedTempFile> {
    let failed = |e: std::io::Error| -> Error {
        BuildError::ExtractionFailed {
            message: format!("Failed to decompress {format} archive: {e}"),
        }
        .into()
    };

    let scratch = tempfile::Builder::new()
        .prefix(srcforge_config::constants::WORK_DIR_PREFIX)
        .suffix(".tar")
        .tempfile_in(work_root)
        .map_err(failed)?;

    let input = tokio::fs::File::open(archive_path).await.map_err(failed)?;
    let reader = BufReader::new(input);
    let mut output = tokio::fs::File::create(scratch.path())
        .await
        .map_err(failed)?;

    match format {
        ArchiveFormat::TarBz2 => {
            let mut decoder = BzDecoder::new(reader);
            tokio::io::copy(&mut decoder, &mut output)
                .await
                .map_err(failed)?;
        }
        _ => {
            let mut decoder = XzDecoder::new(reader);
            tokio::io::copy(&mut decoder, &mut output)
                .await
                .map_err(failed)?;
        }
    }
    output.sync_all().await.map_err(failed)?;

    Ok(scratch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_detection() {
        assert_eq!(ArchiveFormat::from_magic(&[0x1f, 0x8b, 8]), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_magic(b"BZh91AY"), Some(ArchiveFormat::TarBz2));
        assert_eq!(ArchiveFormat::from_magic(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
        let mut tar_header = vec![0u8; 512];
        tar_header[257..262].copy_from_slice(b"ustar");
        assert_eq!(ArchiveFormat::from_magic(&tar_header), Some(ArchiveFormat::Tar));
        assert_eq!(ArchiveFormat::from_magic(b"#!/bin/sh"), None);
    }

    #[test]
    fn test_top_level_dir() {
        assert_eq!(
            top_level_dir(Path::new("./foo-1.0/Makefile")),
            Some(PathBuf::from("foo-1.0"))
        );
        assert_eq!(top_level_dir(Path::new("Makefile")), Some(PathBuf::from("Makefile")));
    }

    #[tokio::test]
    async fn test_unknown_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("notes.txt");
        std::fs::write(&bogus, "just text").unwrap();
        let err = extract_archive(&bogus, dir.path()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Build(BuildError::UnsupportedArchiveFormat { .. })
        ));
    }

    #[test]
    fn test_extension_detection() {
        assert_eq!(
            ArchiveFormat::from_extension(Path::new("/x/foo-1.0.TGZ")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::from_extension(Path::new("foo.tar.xz")),
            Some(ArchiveFormat::TarXz)
        );
        assert_eq!(
            ArchiveFormat::from_extension(Path::new("foo.tar")),
            Some(ArchiveFormat::Tar)
        );
        assert_eq!(ArchiveFormat::from_extension(Path::new("notes.txt")), None);
    }

    #[tokio::test]
    async fn test_empty_tarball_is_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing-1.0.tar");
        let mut builder = tar::Builder::new(std::fs::File::create(&path).unwrap());
        builder.finish().unwrap();
        drop(builder);

        let err = extract_archive(&path, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Build(BuildError::EmptyArchive { .. })));
    }

    #[tokio::test]
    async fn test_gzip_tarball_extracts_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello-1.0.tar.gz");
        let encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);
        let body = b"all:\n\ttrue\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "hello-1.0/Makefile", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let extracted = extract_archive(&path, &dir.path().join("work")).await.unwrap();
        assert_eq!(extracted.format, ArchiveFormat::TarGz);
        assert!(extracted.source_dir.ends_with("hello-1.0"));
        assert!(extracted.source_dir.join("Makefile").is_file());
    }

    #[tokio::test]
    async fn test_zero_byte_file_is_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.tar.gz");
        std::fs::write(&empty, b"").unwrap();
        let err = extract_archive(&empty, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Build(BuildError::EmptyArchive { .. })));
    }
}
