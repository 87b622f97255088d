//! Kernel enumeration inside a root filesystem.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Kernel package name to the kernel releases it installed.
pub type KernelVersions = BTreeMap<String, Vec<String>>;

/// Package name used when nothing better is known.
pub const DEFAULT_KERNEL_PACKAGE: &str = "kernel";

/// Source of the installed kernel set.
///
/// The package database is owned by the host framework; implementations of
/// this trait are the only way the resolver learns which kernels exist.
pub trait KernelInventory {
    fn kernel_versions(&self, root: &Path) -> Result<KernelVersions>;
}

/// Scans `<root>/boot/vmlinuz-*`.
///
/// The owning package is read from `<root>/usr/lib/modules/<ver>/pkgbase`
/// when that file exists, otherwise it is [`DEFAULT_KERNEL_PACKAGE`]. Rescue
/// images are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootDirInventory;

impl KernelInventory for BootDirInventory {
    fn kernel_versions(&self, root: &Path) -> Result<KernelVersions> {
        let boot = root.join("boot");
        let mut versions = KernelVersions::new();
        if !boot.is_dir() {
            return Ok(versions);
        }

        for entry in fs::read_dir(&boot)
            .with_context(|| format!("reading kernel directory '{}'", boot.display()))?
        {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(version) = name.strip_prefix("vmlinuz-") else {
                continue;
            };
            if version.is_empty() || version.contains("rescue") || !entry.path().is_file() {
                continue;
            }

            let package = package_for(root, version);
            versions
                .entry(package)
                .or_default()
                .push(version.to_string());
        }

        for list in versions.values_mut() {
            list.sort();
        }
        Ok(versions)
    }
}

fn package_for(root: &Path, version: &str) -> String {
    let pkgbase = root.join("usr/lib/modules").join(version).join("pkgbase");
    fs::read_to_string(pkgbase)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_KERNEL_PACKAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_root_has_no_kernels() {
        let temp = TempDir::new().unwrap();
        let versions = BootDirInventory.kernel_versions(temp.path()).unwrap();
        assert!(versions.is_empty());
    }

    #[test]
    fn groups_versions_by_package() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("boot")).unwrap();
        fs::write(root.join("boot/vmlinuz-5.10.0-x"), "k").unwrap();
        fs::write(root.join("boot/vmlinuz-5.9.0-x"), "k").unwrap();
        fs::write(root.join("boot/vmlinuz-5.10.0-pae"), "k").unwrap();
        fs::write(root.join("boot/vmlinuz-0-rescue-abc"), "k").unwrap();
        fs::write(root.join("boot/.vmlinuz-5.10.0-x.hmac"), "h").unwrap();
        fs::create_dir_all(root.join("usr/lib/modules/5.10.0-pae")).unwrap();
        fs::write(root.join("usr/lib/modules/5.10.0-pae/pkgbase"), "kernel-PAE\n").unwrap();

        let versions = BootDirInventory.kernel_versions(root).unwrap();

        assert_eq!(versions.len(), 2);
        assert_eq!(versions["kernel"], vec!["5.10.0-x", "5.9.0-x"]);
        assert_eq!(versions["kernel-PAE"], vec!["5.10.0-pae"]);
    }
}
