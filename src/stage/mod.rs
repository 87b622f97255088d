//! Staging tree for the ISO contents.
//!
//! The [`StagingDirectory`] mirrors the root of the final ISO:
//!
//! ```text
//! iso-XXXXXX/
//!   isolinux/     syslinux loader, modules, vmlinuzN, initrdN.img, isolinux.cfg
//!   EFI/BOOT/     shim, GRUB, fonts, grub.cfg
//!   LiveOS/       squashfs.img (or ext3fs.img), osmin.img
//! ```
//!
//! It is owned by a single run and removed when the run ends, whatever the
//! outcome.

pub mod efi;
pub mod syslinux;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::artifact::filesystem::copy_artifact;
use crate::kernel::KernelVariant;
use crate::tools::{Tool, Toolbox};

pub const ISOLINUX_DIR: &str = "isolinux";
pub const EFI_DIR: &str = "EFI";
pub const EFI_BOOT_DIR: &str = "EFI/BOOT";
/// Read by the boot-time live scripts; must not change.
pub const LIVEOS_DIR: &str = "LiveOS";

/// Media check binaries inside the root.
pub const CHECKISOMD5_PATHS: &[&str] = &[
    "usr/bin/checkisomd5",
    "usr/lib/moblin-installer-runtime/checkisomd5",
];

/// Scratch tree populated before mastering.
#[derive(Debug)]
pub struct StagingDirectory {
    dir: TempDir,
}

impl StagingDirectory {
    /// Create `iso-XXXXXX` under `parent`, or the system temp dir.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("iso-");
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating temp parent {}", parent.display()))?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .context("creating staging directory")?;

        tracing::debug!("staging in {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn isolinux_dir(&self) -> PathBuf {
        self.path().join(ISOLINUX_DIR)
    }

    pub fn efi_boot_dir(&self) -> PathBuf {
        self.path().join(EFI_BOOT_DIR)
    }

    pub fn liveos_dir(&self) -> PathBuf {
        self.path().join(LIVEOS_DIR)
    }

    /// Create a subdirectory (relative to the staging root) and return it.
    pub fn ensure_dir(&self, relative: &str) -> Result<PathBuf> {
        let dir = self.path().join(relative);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating staging dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Remove the tree. Failure is logged, never returned.
    pub fn close(self) {
        let path = self.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!("removed staging directory {}", path.display()),
            Err(e) => tracing::warn!(
                "could not remove staging directory {}: {}",
                path.display(),
                e
            ),
        }
    }
}

/// The root can verify its own media and the host can implant the checksum.
pub fn has_checkisomd5(root: &Path, toolbox: &Toolbox) -> bool {
    let in_root = CHECKISOMD5_PATHS.iter().any(|p| root.join(p).exists());
    in_root && toolbox.has(Tool::Implantisomd5)
}

/// First `boot/memtest86*` in the root, in name order.
pub fn find_memtest(root: &Path) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(root.join("boot"))
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("memtest86"))
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    found.sort();
    found.into_iter().next()
}

/// Copy every variant's kernel, initrd and hypervisor into `dir` under
/// their indexed names.
pub fn stage_kernels(dir: &Path, variants: &[KernelVariant]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for variant in variants {
        copy_artifact(&variant.kernel_image, &dir.join(variant.kernel_file()))?;
        copy_artifact(&variant.initrd, &dir.join(variant.initrd_file()))?;
        if let Some(xen) = &variant.xen_image {
            copy_artifact(xen, &dir.join(variant.xen_file()))?;
        }
        tracing::debug!(
            "staged kernel {} as {}",
            variant.version,
            variant.kernel_file()
        );
    }
    Ok(())
}
