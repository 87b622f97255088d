//! x86: syslinux for BIOS, GRUB for EFI when the root ships it.

use anyhow::Result;

use super::{BootContext, BootPlan, BootStrategy, EfiArch, StagedBoot};
use crate::kernel::KernelVariant;
use crate::menu::{build_layout, LayoutOptions};
use crate::render::grub::{self, GrubFlavor};
use crate::render::{syslinux, BootConfig};
use crate::stage::efi::{probe_efi, stage_efi_or_discard};
use crate::stage::syslinux::{probe_syslinux, stage_syslinux};
use crate::stage::{stage_kernels, StagingDirectory};

/// El Torito boot through isolinux.
pub const MKISOFS_BOOT_ARGS: &[&str] = &[
    "-b",
    "isolinux/isolinux.bin",
    "-c",
    "isolinux/boot.cat",
    "-no-emul-boot",
    "-boot-info-table",
    "-boot-load-size",
    "4",
];

#[derive(Debug, Clone, Copy)]
pub struct X86Strategy {
    efi_arch: EfiArch,
}

impl X86Strategy {
    pub fn new(efi_arch: EfiArch) -> Self {
        Self { efi_arch }
    }
}

impl BootStrategy for X86Strategy {
    fn name(&self) -> &'static str {
        "x86"
    }

    fn prepare(&self, ctx: &BootContext<'_>) -> Result<BootPlan> {
        let needs_mboot = ctx.variants.iter().any(KernelVariant::is_xen);
        let syslinux_assets = probe_syslinux(ctx.root, needs_mboot)?;

        let entries = build_layout(
            ctx.variants,
            ctx.menu,
            &LayoutOptions {
                distro_name: &ctx.options.distro_name,
                name: &ctx.options.name,
                has_checkisomd5: ctx.has_checkisomd5,
                has_memtest: syslinux_assets.memtest.is_some(),
            },
        );

        let isolinux = syslinux::render(
            &entries,
            ctx.variants,
            ctx.options,
            &syslinux_assets.features(),
        );

        let mut efi = probe_efi(ctx.root, self.efi_arch);
        let grub_cfg = match &efi {
            Some(_) => grub::render(&entries, ctx.variants, ctx.options, &GrubFlavor::X86),
            None => {
                tracing::warn!("EFI assets not found in the root; the ISO will boot on BIOS only");
                None
            }
        };
        if efi.is_some() && grub_cfg.is_none() {
            tracing::warn!("no EFI-bootable (non-xen) kernel; the ISO will boot on BIOS only");
            efi = None;
        }

        Ok(BootPlan {
            config: BootConfig {
                isolinux: Some(isolinux),
                grub: grub_cfg,
            },
            syslinux: Some(syslinux_assets),
            efi,
        })
    }

    fn stage(
        &self,
        plan: &BootPlan,
        variants: &[KernelVariant],
        staging: &StagingDirectory,
    ) -> Result<StagedBoot> {
        stage_kernels(&staging.isolinux_dir(), variants)?;
        if let (Some(assets), Some(cfg)) = (&plan.syslinux, &plan.config.isolinux) {
            stage_syslinux(staging, assets, cfg)?;
        }

        let efi_enabled = match (&plan.efi, &plan.config.grub) {
            (Some(assets), Some(cfg)) => stage_efi_or_discard(staging, assets, self.efi_arch, cfg),
            _ => false,
        };

        Ok(StagedBoot {
            mkisofs_args: MKISOFS_BOOT_ARGS.iter().map(|a| a.to_string()).collect(),
            efi_enabled,
        })
    }
}
