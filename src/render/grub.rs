//! `grub.cfg` generation for EFI boot.
//!
//! EFI boot offers a single kernel: the default variant, or the first
//! non-xen variant when the default is a xen kernel. Other kernels stay
//! BIOS-only.

use super::{kernel_cmdline, plain_label, BootOptions};
use crate::kernel::KernelVariant;
use crate::menu::{EntryKind, MenuEntry};

/// How GRUB loads kernels on a given firmware/architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrubFlavor {
    /// ISO directory holding `vmlinuzN` / `initrdN.img`.
    pub kernel_dir: &'static str,
    pub linux_cmd: &'static str,
    pub initrd_cmd: &'static str,
}

impl GrubFlavor {
    /// x86 EFI: kernels are shared with the isolinux tree.
    pub const X86: GrubFlavor = GrubFlavor {
        kernel_dir: "/isolinux",
        linux_cmd: "linuxefi",
        initrd_cmd: "initrdefi",
    };

    /// aarch64: there is no isolinux tree, kernels live next to GRUB.
    pub const ARM: GrubFlavor = GrubFlavor {
        kernel_dir: "/EFI/BOOT",
        linux_cmd: "linux",
        initrd_cmd: "initrd",
    };
}

/// The variant EFI boots, if any can be booted at all.
pub fn efi_variant(variants: &[KernelVariant]) -> Option<&KernelVariant> {
    variants
        .iter()
        .find(|v| v.is_default && !v.is_xen())
        .or_else(|| variants.iter().find(|v| !v.is_xen()))
}

fn preamble(options: &BootOptions) -> String {
    let mut out = String::from(
        "set default=\"0\"\n\
         \n\
         function load_video {\n\
         \x20 insmod efi_gop\n\
         \x20 insmod efi_uga\n\
         \x20 insmod video_bochs\n\
         \x20 insmod video_cirrus\n\
         \x20 insmod all_video\n\
         }\n\
         \n\
         load_video\n\
         set gfxpayload=keep\n\
         insmod gzio\n\
         insmod part_gpt\n\
         insmod ext2\n\
         \n",
    );
    out.push_str(&format!("set timeout={}\n", options.timeout_secs));
    out.push('\n');
    out.push_str(&format!("search --no-floppy --set=root -l '{}'\n", options.label));
    out.push('\n');
    out
}

fn menuentry(
    out: &mut String,
    indent: &str,
    title: &str,
    variant: &KernelVariant,
    options: &BootOptions,
    flavor: &GrubFlavor,
    extra: &str,
) {
    out.push_str(&format!(
        "{}menuentry '{}' --class fedora --class gnu-linux --class gnu --class os {{\n",
        indent,
        plain_label(title)
    ));
    out.push_str(&format!(
        "{}\t{} {}/{} {}\n",
        indent,
        flavor.linux_cmd,
        flavor.kernel_dir,
        variant.kernel_file(),
        kernel_cmdline(variant, options, extra)
    ));
    out.push_str(&format!(
        "{}\t{} {}/{}\n",
        indent,
        flavor.initrd_cmd,
        flavor.kernel_dir,
        variant.initrd_file()
    ));
    out.push_str(&format!("{}}}\n", indent));
}

/// Render `grub.cfg`.
///
/// Returns `None` when every variant is a xen kernel, which EFI cannot boot.
pub fn render(
    entries: &[MenuEntry],
    variants: &[KernelVariant],
    options: &BootOptions,
    flavor: &GrubFlavor,
) -> Option<String> {
    let variant = efi_variant(variants)?;
    let for_variant = |kind: EntryKind| {
        entries
            .iter()
            .find(|e| e.kind == kind && e.kernel_index == Some(variant.index))
    };

    let mut out = preamble(options);

    let primary_title = for_variant(EntryKind::Primary)
        .map(|e| e.long.clone())
        .unwrap_or_else(|| format!("Start {}", options.distro_name));
    menuentry(&mut out, "", &primary_title, variant, options, flavor, "");

    if let Some(verify) = for_variant(EntryKind::Verify) {
        menuentry(&mut out, "", &verify.long, variant, options, flavor, &verify.extra);
    }

    out.push_str("submenu 'Troubleshooting -->' {\n");
    if let Some(basic) = for_variant(EntryKind::BasicGraphics) {
        menuentry(&mut out, "\t", &basic.long, variant, options, flavor, &basic.extra);
    }
    out.push_str("}\n");

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{build_layout, LayoutOptions, MenuSpecification};
    use crate::render::test_support::{options, variant};
    use std::path::PathBuf;

    fn layout(variants: &[KernelVariant], checkisomd5: bool) -> Vec<MenuEntry> {
        build_layout(
            variants,
            &MenuSpecification::parse("liveinst"),
            &LayoutOptions {
                distro_name: "Maui",
                name: "maui-live",
                has_checkisomd5: checkisomd5,
                has_memtest: false,
            },
        )
    }

    #[test]
    fn single_kernel_with_verify() {
        let variants = vec![variant(0, "kernel", true)];
        let cfg = render(&layout(&variants, true), &variants, &options(), &GrubFlavor::X86).unwrap();

        assert!(cfg.contains("set timeout=10\n"));
        assert!(cfg.contains("search --no-floppy --set=root -l 'MAUI_LIVE'\n"));
        assert!(cfg.contains("menuentry 'Start Maui' "));
        assert!(cfg.contains(
            "\tlinuxefi /isolinux/vmlinuz0 root=live:LABEL=MAUI_LIVE rootfstype=auto ro liveimg\n"
        ));
        assert!(cfg.contains("\tinitrdefi /isolinux/initrd0.img\n"));
        assert!(cfg.contains("menuentry 'Test this media and start Maui' "));
        assert!(cfg.contains("rd.live.check\n"));
        assert!(cfg.contains("submenu 'Troubleshooting -->' {\n"));
        assert!(cfg.contains("basic graphics mode"));
        assert!(!cfg.contains('^'));
    }

    #[test]
    fn only_one_kernel_is_offered() {
        let variants = vec![variant(0, "kernel", false), variant(1, "kernel-PAE", true)];
        let cfg = render(&layout(&variants, false), &variants, &options(), &GrubFlavor::X86).unwrap();

        assert!(cfg.contains("vmlinuz1"));
        assert!(!cfg.contains("vmlinuz0"));
        assert!(!cfg.contains("Test this media"));
    }

    #[test]
    fn xen_default_falls_back_to_first_plain_kernel() {
        let mut xen = variant(0, "kernel-xen", true);
        xen.xen_image = Some(PathBuf::from("/boot/xen.gz-5.10.0"));
        let variants = vec![xen, variant(1, "kernel", false)];

        assert_eq!(efi_variant(&variants).map(|v| v.index), Some(1));

        let only_xen = vec![variants[0].clone()];
        assert!(render(&layout(&only_xen, false), &only_xen, &options(), &GrubFlavor::X86).is_none());
    }

    #[test]
    fn arm_flavor_uses_plain_linux_command() {
        let variants = vec![variant(0, "kernel", true)];
        let cfg = render(&layout(&variants, false), &variants, &options(), &GrubFlavor::ARM).unwrap();
        assert!(cfg.contains("\tlinux /EFI/BOOT/vmlinuz0 "));
        assert!(cfg.contains("\tinitrd /EFI/BOOT/initrd0.img\n"));
    }
}
