//! Live initramfs regeneration.
//!
//! The installed initramfs is host-only and cannot find a live root, so the
//! first kernel's initramfs is rebuilt inside the root with the dracut live
//! modules. A dracut drop-in carrying the extra storage drivers is written
//! into the root for the duration of the rebuild and put back afterwards.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::InitramfsConfig;
use crate::error::LiveError;
use crate::tools::{Tool, Toolbox};

/// dracut binary inside the root.
pub const DRACUT_CANDIDATES: &[&str] = &["usr/bin/dracut", "usr/sbin/dracut", "sbin/dracut"];

/// Drop-in written into the root while dracut runs.
pub const DRACUT_DROPIN: &str = "etc/dracut.conf.d/99-livecd.conf";

/// Storage drivers every live image carries. Entries starting with `=` are
/// driver groups that dracut already pulls in when not host-only.
pub const BASE_MODULES: &[&str] = &[
    "=ata",
    "sym53c8xx",
    "aic7xxx",
    "=usb",
    "=firewire",
    "=mmc",
    "=pcmcia",
    "mptsas",
];

/// Output path (relative to the root) for a kernel release.
pub fn initramfs_path(version: &str) -> String {
    format!("/boot/initramfs-{}.img", version)
}

/// dracut argument vector, run inside the root.
pub fn dracut_argv(dracut: &str, config: &InitramfsConfig, version: &str) -> Vec<String> {
    vec![
        dracut.to_string(),
        "-f".to_string(),
        "-N".to_string(),
        initramfs_path(version),
        "--add".to_string(),
        config.modules.join(" "),
        "--add-drivers".to_string(),
        config.drivers.join(" "),
        version.to_string(),
    ]
}

/// Content of the dracut drop-in.
pub fn dropin_content(config: &InitramfsConfig) -> String {
    let drivers: Vec<&str> = BASE_MODULES
        .iter()
        .copied()
        .chain(config.extra_modules.iter().map(String::as_str))
        .filter(|m| !m.starts_with('='))
        .collect();
    format!(
        "# written by livecd-creator while building the live initramfs\n\
         hostonly=\"no\"\n\
         add_drivers+=\" {} \"\n",
        drivers.join(" ")
    )
}

/// Restores a file in the root to what it was before we touched it.
struct RestoreOnDrop {
    path: PathBuf,
    previous: Option<Vec<u8>>,
}

impl RestoreOnDrop {
    fn write(path: PathBuf, content: &str) -> Result<Self> {
        let previous = fs::read(&path).ok();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(Self { path, previous })
    }
}

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        let result = match &self.previous {
            Some(bytes) => fs::write(&self.path, bytes),
            None => fs::remove_file(&self.path),
        };
        if let Err(e) = result {
            tracing::warn!("could not restore {}: {}", self.path.display(), e);
        }
    }
}

/// Rebuild the initramfs for `version` inside `root`.
///
/// Returns the host path of the new image.
pub fn regenerate_initramfs(
    root: &Path,
    toolbox: &Toolbox,
    config: &InitramfsConfig,
    version: &str,
) -> Result<PathBuf> {
    let dracut = DRACUT_CANDIDATES
        .iter()
        .find(|p| root.join(p).is_file())
        .ok_or_else(|| LiveError::InitramfsFailed {
            detail: "dracut not found on the image".to_string(),
        })?;

    let chroot = toolbox.cmd(Tool::Chroot)?;
    let _dropin = RestoreOnDrop::write(root.join(DRACUT_DROPIN), &dropin_content(config))?;

    tracing::info!("Regenerating live initramfs for kernel {}", version);
    let argv = dracut_argv(&format!("/{}", dracut), config, version);
    chroot
        .arg_path(root)
        .args(&argv)
        .error_msg(format!("dracut failed for kernel {}", version))
        .run()
        .map_err(|e| LiveError::InitramfsFailed {
            detail: format!("{:#}", e),
        })?;

    let output = root.join(initramfs_path(version).trim_start_matches('/'));
    if !output.is_file() {
        return Err(LiveError::InitramfsFailed {
            detail: format!("dracut did not produce {}", output.display()),
        }
        .into());
    }
    Ok(output)
}
