//! Squashfs image builder.
//!
//! Provides a wrapper around `mksquashfs` for creating compressed
//! filesystem images, and the step that wraps the raw root image into
//! `LiveOS/squashfs.img`.
//!
//! The boot-time live scripts expect the squashfs to contain a single
//! `LiveOS/ext3fs.img`, so the image is moved into that layout inside a
//! scratch directory next to it and the scratch directory is squashed.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::filesystem::atomic_move;
use crate::config::SquashfsConfig;
use crate::error::LiveError;
use crate::stage::LIVEOS_DIR;
use crate::tools::{Tool, Toolbox};

/// Name of the raw root image inside `LiveOS/`.
pub const ROOT_IMAGE_NAME: &str = "ext3fs.img";
pub const SQUASHFS_NAME: &str = "squashfs.img";

/// Options for building a squashfs image.
#[derive(Debug, Clone)]
pub struct SquashfsOptions<'a> {
    /// Compression algorithm (gzip, zstd, xz, lzo, lz4).
    ///
    /// Default: "xz"
    pub compression: &'a str,

    /// Block size (e.g., "128K", "256K", "512K", "1M").
    ///
    /// Default: mksquashfs' own default
    pub block_size: Option<&'a str>,

    /// Whether to include extended attributes.
    ///
    /// Default: false (simpler, more portable)
    pub xattrs: bool,
}

impl Default for SquashfsOptions<'_> {
    fn default() -> Self {
        Self {
            compression: "xz",
            block_size: None,
            xattrs: false,
        }
    }
}

impl<'a> From<&'a SquashfsConfig> for SquashfsOptions<'a> {
    fn from(config: &'a SquashfsConfig) -> Self {
        Self {
            compression: &config.compression,
            block_size: config.block_size.as_deref(),
            xattrs: config.xattrs,
        }
    }
}

/// `mksquashfs` arguments after the program name.
pub fn mksquashfs_args(source: &Path, output: &Path, options: &SquashfsOptions) -> Vec<String> {
    let mut args = vec![
        source.to_string_lossy().into_owned(),
        output.to_string_lossy().into_owned(),
        "-noappend".to_string(),
        "-comp".to_string(),
        options.compression.to_string(),
    ];
    if let Some(block_size) = options.block_size {
        args.push("-b".to_string());
        args.push(block_size.to_string());
    }
    if !options.xattrs {
        args.push("-no-xattrs".to_string());
    }
    args
}

/// Build a squashfs image from a directory or single file.
///
/// # Arguments
///
/// * `toolbox` - Provides the `mksquashfs` binary
/// * `source` - Directory (or file) to pack into squashfs
/// * `output` - Path for the output squashfs file
/// * `options` - Squashfs build options
///
/// # Example
///
/// ```rust,ignore
/// use livecd_creator::artifact::squashfs::{build_squashfs, SquashfsOptions};
/// use std::path::Path;
///
/// let options = SquashfsOptions {
///     compression: "zstd",
///     ..Default::default()
/// };
///
/// build_squashfs(
///     &toolbox,
///     Path::new("scratch/"),
///     Path::new("iso/LiveOS/squashfs.img"),
///     &options,
/// )?;
/// ```
pub fn build_squashfs(
    toolbox: &Toolbox,
    source: &Path,
    output: &Path,
    options: &SquashfsOptions,
) -> Result<()> {
    let cmd = toolbox.cmd(Tool::Mksquashfs).map_err(|e| LiveError::CompressionFailed {
        detail: format!("{:#}", e),
    })?;

    tracing::info!("Creating squashfs {} ({})", output.display(), options.compression);
    cmd.args(mksquashfs_args(source, output, options))
        .error_msg(format!("mksquashfs failed for {}", source.display()))
        .run()
        .map_err(|e| LiveError::CompressionFailed {
            detail: format!("{:#}", e),
        })?;
    Ok(())
}

/// Place the raw root image into `liveos_dir`, compressed unless `skip`.
///
/// The image is consumed on success. When compression fails it is moved
/// back to `image`. Returns the path written.
pub fn stage_root_image(
    toolbox: &Toolbox,
    image: &Path,
    liveos_dir: &Path,
    skip_compression: bool,
    options: &SquashfsOptions,
) -> Result<PathBuf> {
    if skip_compression {
        let dst = liveos_dir.join(ROOT_IMAGE_NAME);
        atomic_move(image, &dst)
            .with_context(|| format!("moving {} into the ISO tree", image.display()))?;
        return Ok(dst);
    }

    let parent = image.parent().unwrap_or_else(|| Path::new("."));
    let scratch = tempfile::Builder::new()
        .prefix(".squash-")
        .tempdir_in(parent)
        .with_context(|| format!("creating scratch dir in {}", parent.display()))?;
    let inner = scratch.path().join(LIVEOS_DIR).join(ROOT_IMAGE_NAME);
    atomic_move(image, &inner)
        .with_context(|| format!("moving {} for compression", image.display()))?;

    let output = liveos_dir.join(SQUASHFS_NAME);
    let built = std::fs::create_dir_all(liveos_dir)
        .with_context(|| format!("creating {}", liveos_dir.display()))
        .and_then(|()| build_squashfs(toolbox, scratch.path(), &output, options));
    if let Err(e) = built {
        // The caller keeps its image when compression fails.
        if let Err(restore) = atomic_move(&inner, image) {
            let kept = scratch.keep();
            tracing::warn!(
                "could not restore {}, image left under {}: {:#}",
                image.display(),
                kept.display(),
                restore
            );
        }
        return Err(e);
    }
    Ok(output)
}
