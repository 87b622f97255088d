//! Filesystem utilities for artifact building.
//!
//! Copies into the staging tree go through [`copy_artifact`] so a failure
//! always surfaces as [`LiveError::ArtifactCopyFailed`]: a rendered boot
//! configuration must never name a file that was not staged.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LiveError;

/// Copy one file into the staging tree.
///
/// The destination's parent directory is created if needed.
///
/// # Example
///
/// ```rust,ignore
/// use livecd_creator::artifact::filesystem::copy_artifact;
/// use std::path::Path;
///
/// copy_artifact(
///     Path::new("/mnt/root/boot/vmlinuz-5.10.0-x"),
///     Path::new("/tmp/iso-abc/isolinux/vmlinuz0"),
/// )?;
/// ```
pub fn copy_artifact(src: &Path, dst: &Path) -> Result<()> {
    let fail = |source| LiveError::ArtifactCopyFailed {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        source,
    };
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(fail)?;
    }
    fs::copy(src, dst).map_err(fail)?;
    Ok(())
}

/// Atomically move a file by renaming, with fallback to copy+delete.
///
/// Useful for the "atomic artifacts" pattern where we build to a temp file
/// and then atomically move to the final destination.
///
/// # Arguments
///
/// * `src` - Source file path
/// * `dst` - Destination file path
pub fn atomic_move(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    // Try atomic rename first (works if same filesystem)
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Different filesystem, fall back to copy+delete
            fs::copy(src, dst)
                .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
            fs::remove_file(src)
                .with_context(|| format!("Failed to remove {}", src.display()))?;
            Ok(())
        }
    }
}

/// Sibling path used while an artifact is being written: `<name>.tmp`.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Remove a file if it exists; other errors are logged.
pub fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("could not remove {}: {}", path.display(), e),
    }
}
