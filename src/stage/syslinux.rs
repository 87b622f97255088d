//! syslinux asset discovery and staging.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::{find_memtest, StagingDirectory};
use crate::artifact::filesystem::copy_artifact;
use crate::error::LiveError;
use crate::render::syslinux::{SyslinuxFeatures, MBOOT_MODULE, MEMTEST_FILE, SPLASH_FILE};

/// Where the syslinux package installs its files, in preference order.
pub const SYSLINUX_DIRS: &[&str] = &["usr/share/syslinux", "usr/lib/syslinux"];

pub const LOADER: &str = "isolinux.bin";

/// Menu modules, best first. One must exist.
pub const MENU_MODULES: &[&str] = &["vesamenu.c32", "menu.c32"];

/// Library modules syslinux 5+ loads at runtime. Copied when present.
pub const SUPPORT_MODULES: &[&str] = &["ldlinux.c32", "libcom32.c32", "libutil.c32"];

pub const SPLASH_CANDIDATES: &[&str] = &[
    "usr/lib/anaconda-runtime/syslinux-vesa-splash.jpg",
    "usr/share/anaconda/boot/syslinux-vesa-splash.jpg",
];

/// Everything the BIOS boot tree needs from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslinuxAssets {
    pub dir: PathBuf,
    pub menu_module: &'static str,
    pub support: Vec<PathBuf>,
    pub mboot: Option<PathBuf>,
    pub splash: Option<PathBuf>,
    pub memtest: Option<PathBuf>,
}

impl SyslinuxAssets {
    pub fn features(&self) -> SyslinuxFeatures {
        SyslinuxFeatures {
            menu_module: self.menu_module.to_string(),
            background: self.splash.is_some(),
        }
    }
}

fn missing(detail: String) -> anyhow::Error {
    LiveError::MissingBootloaderAssets { detail }.into()
}

/// Locate the syslinux files in `root`.
///
/// `needs_mboot` is set when any kernel is a xen kernel; the multiboot module
/// is then mandatory.
pub fn probe_syslinux(root: &Path, needs_mboot: bool) -> Result<SyslinuxAssets> {
    let dir = SYSLINUX_DIRS
        .iter()
        .map(|d| root.join(d))
        .find(|d| d.is_dir())
        .ok_or_else(|| {
            missing(format!(
                "syslinux not installed under {}",
                SYSLINUX_DIRS.join(" or ")
            ))
        })?;

    if !dir.join(LOADER).is_file() {
        return Err(missing(format!("{} not found", dir.join(LOADER).display())));
    }

    let menu_module = MENU_MODULES
        .iter()
        .copied()
        .find(|m| dir.join(m).is_file())
        .ok_or_else(|| missing(format!("no suitable {}/*menu.c32 found", dir.display())))?;

    let mboot = if needs_mboot {
        let path = dir.join(MBOOT_MODULE);
        if !path.is_file() {
            return Err(missing(format!("{} not found", path.display())));
        }
        Some(path)
    } else {
        None
    };

    let support = SUPPORT_MODULES
        .iter()
        .map(|m| dir.join(m))
        .filter(|p| p.is_file())
        .collect();

    let splash = SPLASH_CANDIDATES
        .iter()
        .map(|p| root.join(p))
        .find(|p| p.is_file());
    if splash.is_none() {
        tracing::debug!("no splash image, boot menu will have no background");
    }

    let memtest = find_memtest(root);

    Ok(SyslinuxAssets {
        dir,
        menu_module,
        support,
        mboot,
        splash,
        memtest,
    })
}

/// Copy the syslinux files and write `isolinux.cfg`.
pub fn stage_syslinux(
    staging: &StagingDirectory,
    assets: &SyslinuxAssets,
    config_text: &str,
) -> Result<()> {
    let out = staging.ensure_dir(super::ISOLINUX_DIR)?;

    copy_artifact(&assets.dir.join(LOADER), &out.join(LOADER))?;
    copy_artifact(
        &assets.dir.join(assets.menu_module),
        &out.join(assets.menu_module),
    )?;
    for module in assets.support.iter().chain(assets.mboot.iter()) {
        if let Some(name) = module.file_name() {
            copy_artifact(module, &out.join(name))?;
        }
    }
    if let Some(splash) = &assets.splash {
        copy_artifact(splash, &out.join(SPLASH_FILE))?;
    }
    if let Some(memtest) = &assets.memtest {
        copy_artifact(memtest, &out.join(MEMTEST_FILE))?;
    }

    let cfg = out.join("isolinux.cfg");
    fs::write(&cfg, config_text).with_context(|| format!("writing {}", cfg.display()))?;
    Ok(())
}
