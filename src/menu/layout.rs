//! Ordered menu entry list shared by the syslinux and GRUB renderers.
//!
//! Layout, top to bottom:
//!
//! 1. per kernel: its primary entry, then one entry per specification item
//! 2. the network install entry (once, against the default kernel)
//! 3. the troubleshooting submenu: basic graphics per kernel, media
//!    verification per kernel, memtest, local boot, return to main menu

use super::{known_entry, EntryKind, MenuEntry, MenuSpecification};
use crate::kernel::KernelVariant;

/// Facts about the image that change which entries exist.
#[derive(Debug, Clone)]
pub struct LayoutOptions<'a> {
    pub distro_name: &'a str,
    /// Image name, used to label non-default kernels.
    pub name: &'a str,
    /// The root can check its own media and the host can implant a checksum.
    pub has_checkisomd5: bool,
    /// A memtest binary will be staged.
    pub has_memtest: bool,
}

/// Kernel argument that requests a media check before boot.
pub fn verify_arg(variant: &KernelVariant) -> &'static str {
    if variant.is_dracut {
        "rd.live.check"
    } else {
        "check"
    }
}

/// What "start" means for a variant, as shown in labels.
fn target_name(variant: &KernelVariant, options: &LayoutOptions<'_>) -> String {
    if variant.is_default {
        options.distro_name.to_string()
    } else {
        format!("{}({})", options.name, variant.flavor())
    }
}

fn verify_entry(
    variant: &KernelVariant,
    options: &LayoutOptions<'_>,
    long: Option<&str>,
    extra: Option<&str>,
) -> MenuEntry {
    let known = known_entry("verify").map(|k| k.long).unwrap_or("^Test this media and start");
    MenuEntry {
        short: format!("check{}", variant.index),
        long: long
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} {}", known, target_name(variant, options))),
        extra: extra.unwrap_or(verify_arg(variant)).to_string(),
        help: None,
        kernel_index: Some(variant.index),
        kind: EntryKind::Verify,
    }
}

/// Build the full, ordered entry list.
pub fn build_layout(
    variants: &[KernelVariant],
    spec: &MenuSpecification,
    options: &LayoutOptions<'_>,
) -> Vec<MenuEntry> {
    let mut entries = Vec::new();
    let mut netinst: Option<(Option<String>, Option<String>)> = None;

    for variant in variants {
        let index = variant.index;
        entries.push(MenuEntry {
            short: format!("linux{}", index),
            long: format!("^Start {}", target_name(variant, options)),
            extra: String::new(),
            help: None,
            kernel_index: Some(index),
            kind: EntryKind::Primary,
        });

        for item in &spec.items {
            match known_entry(&item.short) {
                Some(known) if known.kind == EntryKind::Verify => {
                    if options.has_checkisomd5 {
                        entries.push(verify_entry(
                            variant,
                            options,
                            item.long.as_deref(),
                            item.extra.as_deref(),
                        ));
                    }
                }
                Some(known) if known.kind == EntryKind::NetInstall => {
                    if netinst.is_none() {
                        netinst = Some((item.long.clone(), item.extra.clone()));
                    }
                }
                Some(known) => entries.push(MenuEntry {
                    short: format!("{}{}", known.short, index),
                    long: item.long.clone().unwrap_or_else(|| known.long.to_string()),
                    extra: item.extra.clone().unwrap_or_else(|| known.extra.to_string()),
                    help: None,
                    kernel_index: Some(index),
                    kind: known.kind,
                }),
                None => entries.push(MenuEntry {
                    short: format!("{}{}", item.short, index),
                    long: item
                        .long
                        .clone()
                        .unwrap_or_else(|| format!("{} X{}", item.short.to_uppercase(), index)),
                    extra: item.extra.clone().unwrap_or_default(),
                    help: None,
                    kernel_index: Some(index),
                    kind: EntryKind::Custom,
                }),
            }
        }
    }

    let default_index = variants
        .iter()
        .find(|v| v.is_default)
        .map(|v| v.index)
        .unwrap_or(0);

    if let (Some((long, extra)), Some(known)) = (netinst, known_entry("netinst")) {
        entries.push(MenuEntry {
            short: known.short.to_string(),
            long: long.unwrap_or_else(|| known.long.to_string()),
            extra: extra.unwrap_or_else(|| known.extra.to_string()),
            help: None,
            kernel_index: Some(default_index),
            kind: EntryKind::NetInstall,
        });
    }

    entries.push(MenuEntry {
        short: "troubleshooting".to_string(),
        long: "^Troubleshooting".to_string(),
        extra: String::new(),
        help: None,
        kernel_index: None,
        kind: EntryKind::Troubleshooting,
    });

    for variant in variants {
        entries.push(MenuEntry {
            short: format!("basicvideo{}", variant.index),
            long: format!(
                "Start {} in ^basic graphics mode",
                target_name(variant, options)
            ),
            extra: "nomodeset".to_string(),
            help: Some(format!(
                "Try this option out if you're having trouble starting\n{}.",
                options.distro_name
            )),
            kernel_index: Some(variant.index),
            kind: EntryKind::BasicGraphics,
        });
    }

    // Verification lives in the primary block when the specification asks
    // for it there; otherwise it goes here, once per kernel.
    if options.has_checkisomd5 && !spec.contains("verify") {
        for variant in variants {
            entries.push(verify_entry(variant, options, None, None));
        }
    }

    if options.has_memtest {
        entries.push(MenuEntry {
            short: "memtest".to_string(),
            long: "Run a ^memory test".to_string(),
            extra: String::new(),
            help: Some(
                "If your system is having issues, a problem with your\n\
                 system's memory may be the cause. Use this utility to\n\
                 see if the memory is working correctly."
                    .to_string(),
            ),
            kernel_index: None,
            kind: EntryKind::Memtest,
        });
    }

    entries.push(MenuEntry {
        short: "local".to_string(),
        long: "Boot from ^local drive".to_string(),
        extra: String::new(),
        help: None,
        kernel_index: None,
        kind: EntryKind::LocalBoot,
    });

    entries.push(MenuEntry {
        short: "returntomain".to_string(),
        long: "Return to ^main menu".to_string(),
        extra: String::new(),
        help: None,
        kernel_index: None,
        kind: EntryKind::Return,
    });

    entries
}
