//! Bootloader configuration rendering.
//!
//! Pure text generation: everything here takes already resolved kernel
//! variants, a menu layout and probe results, and returns configuration text.
//! Nothing in this module touches the staging tree.
//!
//! - [`syslinux`] - `isolinux/isolinux.cfg` for BIOS boot
//! - [`grub`] - `EFI/BOOT/grub.cfg` for EFI boot

pub mod grub;
pub mod syslinux;

use std::path::Path;

use crate::config::LiveConfig;
use crate::kernel::KernelVariant;

/// Files in the root whose presence enables the graphical boot splash.
pub const GRAPHICAL_BOOT_MARKERS: &[&str] = &["usr/bin/rhgb", "usr/bin/plymouth"];

/// Options shared by every bootloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootOptions {
    pub name: String,
    pub distro_name: String,
    /// ISO volume label the live root is found by.
    pub label: String,
    /// Kernel command line common to every entry.
    pub kernel_options: String,
    pub timeout_secs: u32,
}

impl BootOptions {
    /// Derive boot options from the config and the mounted root.
    pub fn from_config(config: &LiveConfig, root: &Path) -> Self {
        Self {
            name: config.name.clone(),
            distro_name: config.distro_name.clone(),
            label: config.label().to_string(),
            kernel_options: kernel_options(&config.kernel_args, has_graphical_boot(root)),
            timeout_secs: config.timeout,
        }
    }
}

pub fn has_graphical_boot(root: &Path) -> bool {
    GRAPHICAL_BOOT_MARKERS
        .iter()
        .any(|marker| root.join(marker).exists())
}

/// Append `rhgb` when the root boots graphically and the args lack it.
pub fn kernel_options(base: &str, graphical_boot: bool) -> String {
    let base = base.trim();
    if graphical_boot && !base.split_whitespace().any(|a| a == "rhgb") {
        if base.is_empty() {
            "rhgb".to_string()
        } else {
            format!("{} rhgb", base)
        }
    } else {
        base.to_string()
    }
}

/// Root device reference for a variant.
///
/// dracut images find the live root through the `live:` module syntax;
/// legacy initrds only understand a bare CD label.
pub fn root_arg(variant: &KernelVariant, label: &str) -> String {
    if variant.is_dracut {
        format!("root=live:LABEL={}", label)
    } else {
        format!("root=CDLABEL={}", label)
    }
}

/// Full kernel command line for one entry.
pub fn kernel_cmdline(variant: &KernelVariant, options: &BootOptions, extra: &str) -> String {
    let root = root_arg(variant, &options.label);
    [
        root.as_str(),
        "rootfstype=auto",
        options.kernel_options.as_str(),
        extra,
    ]
    .iter()
    .map(|part| part.trim())
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Menu label without syslinux hotkey markers.
pub fn plain_label(long: &str) -> String {
    long.replace('^', "")
}

/// Rendered configuration for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootConfig {
    pub isolinux: Option<String>,
    pub grub: Option<String>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::PathBuf;

    pub fn variant(index: usize, package: &str, is_default: bool) -> KernelVariant {
        KernelVariant {
            package: package.to_string(),
            version: format!("5.10.{}-x", index),
            kernel_image: PathBuf::from(format!("/boot/vmlinuz-5.10.{}-x", index)),
            initrd: PathBuf::from(format!("/boot/initramfs-5.10.{}-x.img", index)),
            is_dracut: true,
            xen_image: None,
            is_default,
            index,
        }
    }

    pub fn options() -> BootOptions {
        BootOptions {
            name: "maui-live".to_string(),
            distro_name: "Maui".to_string(),
            label: "MAUI_LIVE".to_string(),
            kernel_options: "ro liveimg".to_string(),
            timeout_secs: 10,
        }
    }
}
