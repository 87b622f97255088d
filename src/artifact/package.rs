//! Re-wrapping the finished ISO into an archive (`pack_to`).
//!
//! The archive is written to `<target>.tmp` and renamed into place; the bare
//! ISO is removed only after the rename succeeds. On failure the temporary
//! archive is removed and the ISO is left untouched.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::Builder as TarBuilder;

use super::filesystem::{remove_if_exists, tmp_path};
use crate::error::LiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackFormat {
    Tar,
    TarZst,
}

impl PackFormat {
    /// Format implied by the target's file name, if supported.
    pub fn from_target(target: &Path) -> Option<PackFormat> {
        let name = target.file_name()?.to_str()?;
        if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(PackFormat::TarZst)
        } else if name.ends_with(".tar") {
            Some(PackFormat::Tar)
        } else {
            None
        }
    }
}

fn append_iso<W: Write>(builder: &mut TarBuilder<W>, iso: &Path) -> Result<()> {
    let name = iso
        .file_name()
        .with_context(|| format!("{} has no file name", iso.display()))?;
    let mut f = File::open(iso).with_context(|| format!("Failed to open {}", iso.display()))?;
    builder
        .append_file(name, &mut f)
        .with_context(|| format!("Failed to add {} to archive", iso.display()))?;
    Ok(())
}

fn write_archive(iso: &Path, out_path: &Path, format: PackFormat) -> Result<()> {
    let out = File::create(out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    match format {
        PackFormat::Tar => {
            let mut builder = TarBuilder::new(out);
            append_iso(&mut builder, iso)?;
            builder.into_inner()?.sync_all()?;
        }
        PackFormat::TarZst => {
            let encoder = zstd::stream::Encoder::new(out, 3)?;
            let mut builder = TarBuilder::new(encoder);
            append_iso(&mut builder, iso)?;
            let encoder = builder.into_inner()?;
            encoder.finish()?.sync_all()?;
        }
    }
    Ok(())
}

/// Pack `iso` into `target` and remove the bare ISO.
pub fn pack_iso(iso: &Path, target: &Path) -> Result<PathBuf> {
    let fail = |detail: String| LiveError::PackagingFailed {
        target: target.to_path_buf(),
        detail,
    };
    let format = PackFormat::from_target(target)
        .ok_or_else(|| fail("unsupported archive extension".to_string()))?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
    }
    let tmp = tmp_path(target);
    tracing::info!("Packing {} into {}", iso.display(), target.display());

    let written = write_archive(iso, &tmp, format).and_then(|()| {
        fs::rename(&tmp, target)
            .with_context(|| format!("renaming {} to {}", tmp.display(), target.display()))
    });
    if let Err(e) = written {
        remove_if_exists(&tmp);
        return Err(fail(format!("{:#}", e)).into());
    }

    fs::remove_file(iso).map_err(|e| {
        remove_if_exists(target);
        fail(format!("removing {}: {}", iso.display(), e))
    })?;
    Ok(target.to_path_buf())
}
