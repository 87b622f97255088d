//! Kernel/initrd resolution.
//!
//! Turns the installed kernel set into an ordered list of [`KernelVariant`]s:
//! one per kernel release, each paired with its initramfs, classified as
//! dracut-style or legacy, checked for a xen hypervisor, and exactly one of
//! them marked as the default boot target.
//!
//! - [`inventory`] - enumerating kernels in a root filesystem
//! - [`initramfs`] - regenerating the live initramfs with dracut

pub mod initramfs;
pub mod inventory;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::error::LiveError;
pub use inventory::{BootDirInventory, KernelInventory, KernelVersions};

/// Conventional prefix of flavoured kernel packages (`kernel-PAE`).
pub const KERNEL_PACKAGE_PREFIX: &str = "kernel-";

/// One bootable kernel found in the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelVariant {
    /// Owning package, e.g. `kernel` or `kernel-PAE`.
    pub package: String,
    /// Kernel release, e.g. `5.10.0-x`.
    pub version: String,
    pub kernel_image: PathBuf,
    pub initrd: PathBuf,
    /// Initrd built by dracut (combined initramfs) rather than a legacy initrd.
    pub is_dracut: bool,
    /// Hypervisor image found next to the kernel.
    pub xen_image: Option<PathBuf>,
    pub is_default: bool,
    /// Position in discovery order, starting at 0.
    pub index: usize,
}

impl KernelVariant {
    pub fn is_xen(&self) -> bool {
        self.xen_image.is_some()
    }

    /// Staged kernel filename.
    pub fn kernel_file(&self) -> String {
        format!("vmlinuz{}", self.index)
    }

    /// Staged initrd filename.
    pub fn initrd_file(&self) -> String {
        format!("initrd{}.img", self.index)
    }

    /// Staged hypervisor filename.
    pub fn xen_file(&self) -> String {
        format!("xen{}.gz", self.index)
    }

    /// Package name without the `kernel-` prefix, for menu labels.
    pub fn flavor(&self) -> &str {
        self.package
            .strip_prefix(KERNEL_PACKAGE_PREFIX)
            .unwrap_or(&self.package)
    }
}

/// Inputs to resolution besides the root itself.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions<'a> {
    /// Configured default kernel package (`kernel-PAE` or `PAE`).
    pub default_kernel: Option<&'a str>,
    /// Fixed initrd filename under `/boot`, overriding per-version lookup.
    pub alt_initrd_name: Option<&'a str>,
    /// Release whose live initramfs was just regenerated. Its
    /// `initramfs-<ver>.img` wins over `alt_initrd_name`.
    pub regenerated: Option<&'a str>,
}

/// Enumerate kernels, failing with [`LiveError::NoKernelFound`] if there are none.
pub fn enumerate(root: &Path, inventory: &dyn KernelInventory) -> Result<KernelVersions> {
    let versions = inventory.kernel_versions(root)?;
    if versions.values().all(Vec::is_empty) {
        return Err(LiveError::NoKernelFound {
            root: root.to_path_buf(),
        }
        .into());
    }
    Ok(versions)
}

/// Enumerate and resolve in one go.
pub fn resolve_kernels(
    root: &Path,
    inventory: &dyn KernelInventory,
    options: &ResolveOptions<'_>,
) -> Result<Vec<KernelVariant>> {
    let versions = enumerate(root, inventory)?;
    resolve_variants(root, &versions, options)
}

/// Build variants from an already enumerated kernel set.
///
/// Every kernel must have an initrd; the first one missing fails the whole
/// resolution with [`LiveError::MissingInitrd`].
pub fn resolve_variants(
    root: &Path,
    versions: &KernelVersions,
    options: &ResolveOptions<'_>,
) -> Result<Vec<KernelVariant>> {
    let boot = root.join("boot");
    let total: usize = versions.values().map(Vec::len).sum();
    if total == 0 {
        return Err(LiveError::NoKernelFound {
            root: root.to_path_buf(),
        }
        .into());
    }

    let mut variants = Vec::with_capacity(total);
    for (package, releases) in versions {
        for version in releases {
            let index = variants.len();
            let regenerated = options.regenerated == Some(version.as_str());
            let (initrd, is_dracut) =
                locate_initrd(&boot, version, options.alt_initrd_name, regenerated)?;
            let xen_image = locate_xen(&boot, version);

            tracing::debug!(
                "kernel {} ({}) -> index {}, dracut={}, xen={}",
                version,
                package,
                index,
                is_dracut,
                xen_image.is_some()
            );

            variants.push(KernelVariant {
                package: package.clone(),
                version: version.clone(),
                kernel_image: boot.join(format!("vmlinuz-{}", version)),
                initrd,
                is_dracut,
                xen_image,
                is_default: false,
                index,
            });
        }
    }

    let default_index = variants
        .iter()
        .position(|v| is_default_kernel(&v.package, total, options.default_kernel))
        .unwrap_or(0);
    variants[default_index].is_default = true;

    Ok(variants)
}

/// Whether `package` is the configured default kernel.
///
/// A lone kernel is always the default. Otherwise the configured name must
/// match exactly or after stripping the `kernel-` prefix.
pub fn is_default_kernel(package: &str, total: usize, default_kernel: Option<&str>) -> bool {
    if total == 1 {
        return true;
    }
    let Some(wanted) = default_kernel else {
        return false;
    };
    package == wanted || package.strip_prefix(KERNEL_PACKAGE_PREFIX) == Some(wanted)
}

/// Combined initramfs first, then a separate initrd.
///
/// `alt_initrd_name` replaces both, except for a `regenerated` release whose
/// fresh initramfs is tried first.
fn locate_initrd(
    boot: &Path,
    version: &str,
    alt_initrd_name: Option<&str>,
    regenerated: bool,
) -> Result<(PathBuf, bool)> {
    let initramfs = format!("initramfs-{}.img", version);
    let candidates: Vec<String> = match alt_initrd_name {
        Some(name) if regenerated => vec![initramfs, name.to_string()],
        Some(name) => vec![name.to_string()],
        None => vec![initramfs, format!("initrd-{}.img", version)],
    };

    for name in &candidates {
        let path = boot.join(name);
        if path.is_file() {
            return Ok((path, name.starts_with("initramfs")));
        }
    }

    Err(LiveError::MissingInitrd {
        version: version.to_string(),
        searched: candidates,
    }
    .into())
}

/// `xen.gz-<version>`, or with a trailing `xen` flavour stripped from the
/// version (`2.6.18-128.el5xen` pairs with `xen.gz-2.6.18-128.el5`).
fn locate_xen(boot: &Path, version: &str) -> Option<PathBuf> {
    let mut candidates = vec![format!("xen.gz-{}", version)];
    if let Some(stripped) = version.strip_suffix("xen") {
        candidates.push(format!("xen.gz-{}", stripped));
    }
    candidates
        .into_iter()
        .map(|name| boot.join(name))
        .find(|p| p.is_file())
}
