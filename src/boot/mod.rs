//! Architecture-specific boot setup.
//!
//! The architecture is resolved once from configuration into an
//! [`Architecture`]; an unsupported one is rejected there, before any run
//! starts. Each supported architecture has a [`BootStrategy`] that probes the
//! root for bootloader assets, renders the configuration text and later
//! stages everything that text references.
//!
//! | Architecture | BIOS     | EFI                 | mkisofs boot flags |
//! |--------------|----------|---------------------|--------------------|
//! | x86          | syslinux | GRUB (optional)     | isolinux El Torito |
//! | arm          | -        | GRUB (required)     | none               |

pub mod arm;
pub mod x86;

use anyhow::Result;
use std::path::Path;

use crate::error::LiveError;
use crate::kernel::KernelVariant;
use crate::menu::MenuSpecification;
use crate::render::{BootConfig, BootOptions};
use crate::stage::efi::EfiAssets;
use crate::stage::syslinux::SyslinuxAssets;
use crate::stage::StagingDirectory;

pub use arm::ArmStrategy;
pub use x86::X86Strategy;

/// EFI binary naming per architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfiArch {
    X64,
    Ia32,
    Aa64,
}

impl EfiArch {
    /// Lowercase suffix used by vendor file names (`grubx64.efi`).
    pub fn suffix(self) -> &'static str {
        match self {
            EfiArch::X64 => "x64",
            EfiArch::Ia32 => "ia32",
            EfiArch::Aa64 => "aa64",
        }
    }

    /// Removable-media boot file name firmware looks for.
    pub fn boot_file(self) -> String {
        format!("BOOT{}.EFI", self.suffix().to_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Architecture {
    X86 { efi: EfiArch },
    Arm,
    Unsupported(String),
}

impl Architecture {
    /// Classify an architecture name. `auto` means the host architecture.
    pub fn classify(name: &str) -> Architecture {
        let name = if name == "auto" {
            std::env::consts::ARCH
        } else {
            name
        };
        match name {
            "x86_64" | "amd64" => Architecture::X86 { efi: EfiArch::X64 },
            "x86" | "i386" | "i586" | "i686" => Architecture::X86 { efi: EfiArch::Ia32 },
            "aarch64" | "arm64" => Architecture::Arm,
            other if other.starts_with("arm") => Architecture::Arm,
            other => Architecture::Unsupported(other.to_string()),
        }
    }

    /// Classify and reject unsupported architectures.
    pub fn resolve(name: &str) -> Result<Architecture> {
        match Self::classify(name) {
            Architecture::Unsupported(arch) => {
                Err(LiveError::UnsupportedArchitecture { arch }.into())
            }
            arch => Ok(arch),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Architecture::X86 { efi: EfiArch::Ia32 } => "i686",
            Architecture::X86 { .. } => "x86_64",
            Architecture::Arm => "aarch64",
            Architecture::Unsupported(arch) => arch,
        }
    }

    /// Strategy for this architecture.
    pub fn strategy(&self) -> Result<Box<dyn BootStrategy>> {
        match self {
            Architecture::X86 { efi } => Ok(Box::new(X86Strategy::new(*efi))),
            Architecture::Arm => Ok(Box::new(ArmStrategy)),
            Architecture::Unsupported(arch) => Err(LiveError::UnsupportedArchitecture {
                arch: arch.clone(),
            }
            .into()),
        }
    }
}

/// Inputs to [`BootStrategy::prepare`].
#[derive(Debug, Clone, Copy)]
pub struct BootContext<'a> {
    pub root: &'a Path,
    pub variants: &'a [KernelVariant],
    pub menu: &'a MenuSpecification,
    pub options: &'a BootOptions,
    pub has_checkisomd5: bool,
}

/// Probe results plus rendered configuration, ready to stage.
#[derive(Debug, Clone)]
pub struct BootPlan {
    pub config: BootConfig,
    pub syslinux: Option<SyslinuxAssets>,
    /// `None` when EFI is disabled for this run.
    pub efi: Option<EfiAssets>,
}

/// What staging produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedBoot {
    /// Boot arguments appended to the genisoimage command line.
    pub mkisofs_args: Vec<String>,
    pub efi_enabled: bool,
}

pub trait BootStrategy {
    fn name(&self) -> &'static str;

    /// Probe assets and render configuration. Writes nothing.
    fn prepare(&self, ctx: &BootContext<'_>) -> Result<BootPlan>;

    /// Copy kernels, bootloader files and configuration into the staging tree.
    fn stage(
        &self,
        plan: &BootPlan,
        variants: &[KernelVariant],
        staging: &StagingDirectory,
    ) -> Result<StagedBoot>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{failure_kind, FailureKind};

    #[test]
    fn classify_names() {
        assert_eq!(
            Architecture::classify("x86_64"),
            Architecture::X86 { efi: EfiArch::X64 }
        );
        assert_eq!(
            Architecture::classify("i686"),
            Architecture::X86 { efi: EfiArch::Ia32 }
        );
        assert_eq!(Architecture::classify("armv7hl"), Architecture::Arm);
        assert_eq!(Architecture::classify("aarch64"), Architecture::Arm);
        assert_eq!(
            Architecture::classify("ppc64le"),
            Architecture::Unsupported("ppc64le".to_string())
        );
    }

    #[test]
    fn unsupported_is_a_config_error() {
        let err = Architecture::resolve("s390x").unwrap_err();
        assert_eq!(failure_kind(&err), FailureKind::UnsupportedArchitecture);
        assert!(Architecture::Unsupported("s390x".into()).strategy().is_err());
    }

    #[test]
    fn efi_boot_file_names() {
        assert_eq!(EfiArch::X64.boot_file(), "BOOTX64.EFI");
        assert_eq!(EfiArch::Ia32.boot_file(), "BOOTIA32.EFI");
        assert_eq!(EfiArch::Aa64.boot_file(), "BOOTAA64.EFI");
    }
}
