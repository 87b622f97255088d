//! EFI asset discovery and staging.
//!
//! EFI support is all or nothing: a tree with a shim but no GRUB (or no
//! font) boots nowhere, so either every asset is staged or the `EFI/`
//! subtree is removed again.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::{StagingDirectory, EFI_BOOT_DIR, EFI_DIR};
use crate::artifact::filesystem::copy_artifact;
use crate::boot::EfiArch;

/// Vendor directories live under this path in the root.
pub const EFI_VENDOR_ROOT: &str = "boot/efi/EFI";

pub const FONT_FILE: &str = "unicode.pf2";

/// Fallback font locations when the vendor tree ships none.
pub const FONT_FALLBACKS: &[&str] = &["usr/share/grub/unicode.pf2", "usr/share/grub2/unicode.pf2"];

/// The three files an EFI boot tree needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfiAssets {
    /// Secure-boot first stage, staged as `BOOT<ARCH>.EFI`.
    pub shim: PathBuf,
    pub grub: PathBuf,
    pub font: PathBuf,
}

fn vendor_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root.join(EFI_VENDOR_ROOT)) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_name().eq_ignore_ascii_case("BOOT"))
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Find shim, GRUB and font for `arch`.
///
/// Returns `None` (and logs what is missing) unless all three exist.
pub fn probe_efi(root: &Path, arch: EfiArch) -> Option<EfiAssets> {
    let suffix = arch.suffix();
    let grub_name = format!("grub{}.efi", suffix);
    let shim_names = [format!("shim{}.efi", suffix), "shim.efi".to_string()];

    let Some(vendor) = vendor_dirs(root)
        .into_iter()
        .find(|d| d.join(&grub_name).is_file())
    else {
        tracing::debug!("no {} under {}", grub_name, root.join(EFI_VENDOR_ROOT).display());
        return None;
    };

    let Some(shim) = shim_names
        .iter()
        .map(|n| vendor.join(n))
        .find(|p| p.is_file())
    else {
        tracing::debug!("no shim in {}", vendor.display());
        return None;
    };

    let Some(font) = std::iter::once(vendor.join("fonts").join(FONT_FILE))
        .chain(FONT_FALLBACKS.iter().map(|p| root.join(p)))
        .find(|p| p.is_file())
    else {
        tracing::debug!("no GRUB font found");
        return None;
    };

    Some(EfiAssets {
        grub: vendor.join(&grub_name),
        shim,
        font,
    })
}

/// Copy the EFI assets and write `grub.cfg`. Leaves partial state on error.
pub fn stage_efi(
    staging: &StagingDirectory,
    assets: &EfiAssets,
    arch: EfiArch,
    grub_cfg: &str,
) -> Result<()> {
    let out = staging.ensure_dir(EFI_BOOT_DIR)?;
    copy_artifact(&assets.shim, &out.join(arch.boot_file()))?;
    copy_artifact(&assets.grub, &out.join(format!("grub{}.efi", arch.suffix())))?;
    let fonts = out.join("fonts");
    fs::create_dir_all(&fonts).with_context(|| format!("creating {}", fonts.display()))?;
    copy_artifact(&assets.font, &fonts.join(FONT_FILE))?;

    let cfg = out.join("grub.cfg");
    fs::write(&cfg, grub_cfg).with_context(|| format!("writing {}", cfg.display()))?;
    Ok(())
}

/// Stage EFI, or remove whatever was staged and report EFI as disabled.
pub fn stage_efi_or_discard(
    staging: &StagingDirectory,
    assets: &EfiAssets,
    arch: EfiArch,
    grub_cfg: &str,
) -> bool {
    match stage_efi(staging, assets, arch, grub_cfg) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("EFI staging failed, building a BIOS-only ISO: {:#}", e);
            discard(staging);
            false
        }
    }
}

/// Remove the whole `EFI/` subtree.
pub fn discard(staging: &StagingDirectory) {
    let efi = staging.path().join(EFI_DIR);
    if efi.exists() {
        if let Err(e) = fs::remove_dir_all(&efi) {
            tracing::warn!("could not remove {}: {}", efi.display(), e);
        }
    }
}
