//! ARM: EFI only.
//!
//! Without syslinux there is no fallback, so missing EFI assets or a root with
//! only xen kernels fail the run instead of degrading it.

use anyhow::Result;

use super::{BootContext, BootPlan, BootStrategy, EfiArch, StagedBoot};
use crate::error::LiveError;
use crate::kernel::KernelVariant;
use crate::menu::{build_layout, LayoutOptions};
use crate::render::grub::{self, GrubFlavor};
use crate::render::BootConfig;
use crate::stage::efi::{probe_efi, stage_efi};
use crate::stage::{stage_kernels, StagingDirectory};

#[derive(Debug, Clone, Copy, Default)]
pub struct ArmStrategy;

impl BootStrategy for ArmStrategy {
    fn name(&self) -> &'static str {
        "arm"
    }

    fn prepare(&self, ctx: &BootContext<'_>) -> Result<BootPlan> {
        let assets = probe_efi(ctx.root, EfiArch::Aa64).ok_or_else(|| {
            LiveError::MissingBootloaderAssets {
                detail: "shimaa64.efi, grubaa64.efi and unicode.pf2 are required on ARM"
                    .to_string(),
            }
        })?;

        let entries = build_layout(
            ctx.variants,
            ctx.menu,
            &LayoutOptions {
                distro_name: &ctx.options.distro_name,
                name: &ctx.options.name,
                has_checkisomd5: ctx.has_checkisomd5,
                has_memtest: false,
            },
        );

        let grub_cfg = grub::render(&entries, ctx.variants, ctx.options, &GrubFlavor::ARM)
            .ok_or_else(|| LiveError::MissingBootloaderAssets {
                detail: "no EFI-bootable kernel in the root".to_string(),
            })?;

        Ok(BootPlan {
            config: BootConfig {
                isolinux: None,
                grub: Some(grub_cfg),
            },
            syslinux: None,
            efi: Some(assets),
        })
    }

    fn stage(
        &self,
        plan: &BootPlan,
        variants: &[KernelVariant],
        staging: &StagingDirectory,
    ) -> Result<StagedBoot> {
        let (Some(assets), Some(cfg)) = (&plan.efi, &plan.config.grub) else {
            return Err(LiveError::MissingBootloaderAssets {
                detail: "boot plan has no EFI configuration".to_string(),
            }
            .into());
        };
        stage_kernels(&staging.efi_boot_dir(), variants)?;
        stage_efi(staging, assets, EfiArch::Aa64, cfg)?;

        Ok(StagedBoot {
            mkisofs_args: Vec::new(),
            efi_enabled: true,
        })
    }
}
