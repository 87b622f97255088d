//! `isolinux.cfg` generation.

use super::{kernel_cmdline, BootOptions};
use crate::kernel::KernelVariant;
use crate::menu::{EntryKind, MenuEntry};

/// Staged name of the background image, relative to `isolinux/`.
pub const SPLASH_FILE: &str = "splash.jpg";

/// Staged name of the memtest binary, relative to `isolinux/`.
pub const MEMTEST_FILE: &str = "memtest";

/// Multiboot module used to chain xen hypervisors.
pub const MBOOT_MODULE: &str = "mboot.c32";

/// What the staged syslinux tree provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslinuxFeatures {
    /// Menu module set as `default` (`vesamenu.c32` or `menu.c32`).
    pub menu_module: String,
    /// A splash image will be staged as [`SPLASH_FILE`].
    pub background: bool,
}

const COLOR_THEME: &str = "\
menu color border * #00000000 #00000000 none
menu color sel 0 #ff3a6496 #00000000 none
menu color title 0 #ff7ba3d0 #00000000 none
menu color tabmsg 0 #ff3a6496 #00000000 none
menu color unsel 0 #ff347ead #00000000 none
menu color hotsel 0 #ff64b0ea #00000000 none
menu color hotkey 0 #ffffffff #00000000 none
menu color help 0 #993677bc #00000000 none
menu color scrollbar 0 #ffffffff #ff355594 none
menu color timeout 0 #ff999999 #00000000 none
menu color timeout_msg 0 #ff444b54 #00000000 none
menu color cmdmark 0 #844bb2e5 #00000000 none
menu color cmdline 0 #ffffffff #00000000 none
";

fn header(options: &BootOptions, features: &SyslinuxFeatures) -> String {
    let mut out = String::new();
    out.push_str(&format!("default {}\n", features.menu_module));
    // syslinux timeouts are in tenths of a second.
    out.push_str(&format!("timeout {}\n", options.timeout_secs.saturating_mul(10)));
    out.push('\n');
    if features.background {
        out.push_str(&format!("menu background {}\n", SPLASH_FILE));
    }
    out.push_str(&format!(
        "menu autoboot Starting {} in # second{{,s}}. Press any key to interrupt.\n",
        options.distro_name
    ));
    out.push('\n');
    out.push_str("menu clear\n");
    out.push_str(&format!("menu title {}\n", options.distro_name));
    out.push_str(
        "menu width 78\n\
         menu margin 4\n\
         menu rows 7\n\
         menu vshift 10\n\
         menu tabmsgrow 14\n\
         menu cmdlinerow 14\n\
         menu helpmsgrow 16\n\
         menu helpmsgendrow 29\n\n",
    );
    out.push_str(COLOR_THEME);
    out.push('\n');
    out.push_str("menu tabmsg Press Tab for full configuration options on menu items.\n");
    out.push_str("menu separator\n");
    out.push_str("menu separator\n\n");
    out
}

fn help_block(out: &mut String, help: &str) {
    out.push_str("  text help\n");
    for line in help.lines() {
        out.push_str(&format!("    {}\n", line));
    }
    out.push_str("  endtext\n");
}

fn image_stanza(
    out: &mut String,
    entry: &MenuEntry,
    variant: &KernelVariant,
    options: &BootOptions,
) {
    let cmdline = kernel_cmdline(variant, options, &entry.extra);

    out.push_str(&format!("label {}\n", entry.short));
    out.push_str(&format!("  menu label {}\n", entry.long));
    if let Some(help) = &entry.help {
        help_block(out, help);
    }
    if variant.is_xen() {
        out.push_str(&format!("  kernel {}\n", MBOOT_MODULE));
        out.push_str(&format!(
            "  append {} --- {} {} --- {}\n",
            variant.xen_file(),
            variant.kernel_file(),
            cmdline,
            variant.initrd_file()
        ));
    } else {
        out.push_str(&format!("  kernel {}\n", variant.kernel_file()));
        out.push_str(&format!(
            "  append initrd={} {}\n",
            variant.initrd_file(),
            cmdline
        ));
    }
    if entry.kind == EntryKind::Primary && variant.is_default {
        out.push_str("  menu default\n");
    }
}

/// Render `isolinux.cfg` from an ordered entry list.
///
/// Entries that point at a kernel index with no matching variant are skipped.
pub fn render(
    entries: &[MenuEntry],
    variants: &[KernelVariant],
    options: &BootOptions,
    features: &SyslinuxFeatures,
) -> String {
    let mut out = header(options, features);

    for entry in entries {
        match entry.kind {
            EntryKind::Troubleshooting => {
                out.push_str("menu separator\n");
                out.push_str(&format!("menu begin {}\n", entry.long));
                out.push_str("  menu title Troubleshooting\n");
            }
            EntryKind::Memtest => {
                out.push_str(&format!("label {}\n", entry.short));
                out.push_str(&format!("  menu label {}\n", entry.long));
                if let Some(help) = &entry.help {
                    help_block(&mut out, help);
                }
                out.push_str(&format!("  kernel {}\n", MEMTEST_FILE));
            }
            EntryKind::LocalBoot => {
                out.push_str(&format!("label {}\n", entry.short));
                out.push_str(&format!("  menu label {}\n", entry.long));
                out.push_str("  localboot 0xffff\n");
            }
            EntryKind::Return => {
                out.push_str("menu separator\n");
                out.push_str(&format!("label {}\n", entry.short));
                out.push_str(&format!("  menu label {}\n", entry.long));
                out.push_str("  menu exit\n");
                out.push_str("menu end\n");
            }
            _ => {
                let Some(variant) = entry
                    .kernel_index
                    .and_then(|i| variants.iter().find(|v| v.index == i))
                else {
                    tracing::debug!("menu entry {} has no kernel, skipped", entry.short);
                    continue;
                };
                image_stanza(&mut out, entry, variant, options);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{build_layout, LayoutOptions, MenuSpecification};
    use crate::render::test_support::{options, variant};
    use std::path::PathBuf;

    fn features() -> SyslinuxFeatures {
        SyslinuxFeatures {
            menu_module: "vesamenu.c32".to_string(),
            background: false,
        }
    }

    fn layout(variants: &[KernelVariant], checkisomd5: bool, memtest: bool) -> Vec<MenuEntry> {
        build_layout(
            variants,
            &MenuSpecification::parse("liveinst autoinst"),
            &LayoutOptions {
                distro_name: "Maui",
                name: "maui-live",
                has_checkisomd5: checkisomd5,
                has_memtest: memtest,
            },
        )
    }

    #[test]
    fn header_uses_tenths_of_seconds() {
        let variants = vec![variant(0, "kernel", true)];
        let cfg = render(&layout(&variants, false, false), &variants, &options(), &features());

        assert!(cfg.starts_with("default vesamenu.c32\ntimeout 100\n"));
        assert!(cfg.contains("menu title Maui\n"));
        assert!(!cfg.contains("menu background"));
    }

    #[test]
    fn huge_timeout_saturates() {
        let variants = vec![variant(0, "kernel", true)];
        let mut opts = options();
        opts.timeout_secs = u32::MAX;
        let cfg = render(&layout(&variants, false, false), &variants, &opts, &features());
        assert!(cfg.contains(&format!("\ntimeout {}\n", u32::MAX)));
    }

    #[test]
    fn single_kernel_stanza() {
        let variants = vec![variant(0, "kernel", true)];
        let cfg = render(&layout(&variants, true, false), &variants, &options(), &features());

        assert!(cfg.contains(
            "label linux0\n  menu label ^Start Maui\n  kernel vmlinuz0\n  \
             append initrd=initrd0.img root=live:LABEL=MAUI_LIVE rootfstype=auto ro liveimg\n  \
             menu default\n"
        ));
        assert!(cfg.contains("append initrd=initrd0.img root=live:LABEL=MAUI_LIVE rootfstype=auto ro liveimg liveinst nosplash 4\n"));
        assert!(cfg.contains("label check0\n"));
        assert!(cfg.contains("rd.live.check\n"));
    }

    #[test]
    fn exactly_one_menu_default_on_default_variant() {
        let variants = vec![
            variant(0, "kernel", false),
            variant(1, "kernel-PAE", true),
            variant(2, "kernel-debug", false),
        ];
        let cfg = render(&layout(&variants, true, true), &variants, &options(), &features());

        assert_eq!(cfg.matches("menu default").count(), 1);
        let at = cfg.find("  menu default\n").unwrap();
        let stanza_start = cfg[..at].rfind("label ").unwrap();
        assert!(cfg[stanza_start..].starts_with("label linux1\n"));
    }

    #[test]
    fn xen_stanza_chains_through_mboot() {
        let mut v = variant(0, "kernel-xen", true);
        v.xen_image = Some(PathBuf::from("/boot/xen.gz-5.10.0"));
        let variants = vec![v];
        let cfg = render(&layout(&variants, false, false), &variants, &options(), &features());

        assert!(cfg.contains("  kernel mboot.c32\n"));
        assert!(cfg.contains(
            "  append xen0.gz --- vmlinuz0 root=live:LABEL=MAUI_LIVE rootfstype=auto ro liveimg --- initrd0.img\n"
        ));
    }

    #[test]
    fn troubleshooting_submenu_is_closed() {
        let variants = vec![variant(0, "kernel", true)];
        let cfg = render(&layout(&variants, false, true), &variants, &options(), &features());

        let begin = cfg.find("menu begin ^Troubleshooting").unwrap();
        let end = cfg.find("menu end").unwrap();
        assert!(begin < end);
        let submenu = &cfg[begin..end];
        assert!(submenu.contains("label basicvideo0"));
        assert!(submenu.contains("nomodeset"));
        assert!(submenu.contains("  kernel memtest\n"));
        assert!(submenu.contains("  localboot 0xffff\n"));
        assert!(submenu.contains("  menu exit\n"));
    }

    #[test]
    fn background_directive_follows_feature() {
        let variants = vec![variant(0, "kernel", true)];
        let mut f = features();
        f.background = true;
        let cfg = render(&layout(&variants, false, false), &variants, &options(), &f);
        assert!(cfg.contains("menu background splash.jpg\n"));
    }
}
