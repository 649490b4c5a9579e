//! Archive extraction for toolchain artifacts.
//!
//! Zig publishes `.tar.xz` archives for Unix hosts and `.zip` archives for
//! Windows. Extraction happens in-process, so no external `tar` is involved.
//! A fixed number of leading path components is stripped from every entry,
//! the same way `tar --strip-components` does.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tokio_util::sync::CancellationToken;
use xz2::read::XzDecoder;

use crate::error::{Error, Result};

/// Extracts `archive_path` into `dest_dir`, choosing the format by extension.
///
/// # Errors
///
/// Returns an error if:
/// - The extension is not `.tar.xz`, `.tar.gz`, `.tgz` or `.zip`
/// - The archive cannot be read or is corrupt
/// - An entry would escape `dest_dir`
/// - Directory or file creation fails
///
/// Returns [`Error::Cancelled`] if `cancel` fires; the partial tree is left
/// for the caller to remove.
pub fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    strip_components: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    std::fs::create_dir_all(dest_dir)
        .map_err(|e| Error::io(format!("failed to create directory {}", dest_dir.display()), e))?;

    if name.ends_with(".tar.xz") {
        let file = open(archive_path)?;
        unpack_tar(Archive::new(XzDecoder::new(file)), dest_dir, strip_components, cancel)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = open(archive_path)?;
        unpack_tar(Archive::new(GzDecoder::new(file)), dest_dir, strip_components, cancel)
    } else if name.ends_with(".zip") {
        extract_zip(archive_path, dest_dir, strip_components, cancel)
    } else {
        Err(Error::format(
            "archive",
            format!("unsupported archive type: {}", archive_path.display()),
        ))
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::io(format!("failed to open archive {}", path.display()), e))
}

/// Strips `count` leading components and rejects anything that could escape
/// the destination. Returns `None` for entries consumed by the strip.
fn stripped_path(entry_path: &Path, count: usize) -> Result<Option<PathBuf>> {
    if entry_path.is_absolute()
        || entry_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(Error::format(
            "archive",
            format!(
                "refusing to extract path with parent directory or absolute reference: {}",
                entry_path.display()
            ),
        ));
    }
    let relative: PathBuf = entry_path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .skip(count)
        .collect();
    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

fn unpack_tar<R: Read>(
    mut archive: Archive<R>,
    dest_dir: &Path,
    strip: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let entries = archive
        .entries()
        .map_err(|e| Error::format("tar archive", e))?;

    for entry in entries {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut entry = entry.map_err(|e| Error::format("tar archive", e))?;
        let entry_path = entry
            .path()
            .map_err(|e| Error::format("tar entry path", e))?
            .into_owned();
        let Some(relative) = stripped_path(&entry_path, strip)? else {
            continue;
        };
        let output_path = dest_dir.join(&relative);
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("failed to create directory {}", parent.display()), e)
            })?;
        }
        entry
            .unpack(&output_path)
            .map_err(|e| Error::io(format!("failed to extract {}", output_path.display()), e))?;
    }
    Ok(())
}

fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
    strip: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut archive =
        zip::ZipArchive::new(open(archive_path)?).map_err(|e| Error::format("zip archive", e))?;

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::format("zip archive", e))?;
        let entry_path = entry.enclosed_name().ok_or_else(|| {
            Error::format("zip archive", format!("invalid entry path: {}", entry.name()))
        })?;
        let Some(relative) = stripped_path(&entry_path, strip)? else {
            continue;
        };
        let output_path = dest_dir.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&output_path).map_err(|e| {
                Error::io(format!("failed to create directory {}", output_path.display()), e)
            })?;
            continue;
        }
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("failed to create directory {}", parent.display()), e)
            })?;
        }
        let mut outfile = File::create(&output_path)
            .map_err(|e| Error::io(format!("failed to create file {}", output_path.display()), e))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| Error::io(format!("failed to extract {}", output_path.display()), e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&output_path, std::fs::Permissions::from_mode(mode & 0o777))
                .map_err(|e| {
                    Error::io(format!("failed to set permissions {}", output_path.display()), e)
                })?;
        }
    }
    Ok(())
}

/// Sets `0o755` on an installed executable.
///
/// # Errors
///
/// Returns [`Error::Io`] if the metadata cannot be read or updated.
#[cfg(unix)]
pub fn set_executable_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| Error::io(format!("failed to get metadata {}", path.display()), e))?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
        .map_err(|e| Error::io(format!("failed to set permissions {}", path.display()), e))
}

/// Sets executable permissions (no-op on Windows).
#[cfg(windows)]
#[allow(clippy::unnecessary_wraps)]
pub fn set_executable_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
