//! Stage and assemble bootable Live ISO images from a pre-built root.
//!
//! The crate takes a root filesystem that has already been built (kernels
//! under `/boot`, bootloader packages installed) plus its raw ext image, and
//! turns them into a hybrid Live ISO:
//!
//! - **Kernel resolution** - which kernels to boot, their initrds, the default
//! - **Boot configuration** - `isolinux.cfg` and `grub.cfg` rendered from a menu specification
//! - **Staging** - kernels, bootloader binaries and EFI assets copied into a scratch tree
//! - **Image minimizing/compression** - `LiveOS/osmin.img` and `LiveOS/squashfs.img`
//! - **ISO assembly** - genisoimage, isohybrid, implantisomd5, optional archive repacking
//!
//! # Architecture
//!
//! ```text
//! LiveConfig (TOML) ──> LivePipeline::run(&mut dyn RootProvider)
//!     │
//!     ├── kernel:   KernelInventory -> Vec<KernelVariant>
//!     ├── boot:     Architecture -> Box<dyn BootStrategy>
//!     │               ├── menu + render: BootConfig text
//!     │               └── stage: StagingDirectory (isolinux/, EFI/BOOT/)
//!     ├── artifact: resparse, osmin.img, squashfs.img (LiveOS/)
//!     └── artifact: <name>.iso, optional pack_to, .sha256, manifest
//! ```
//!
//! Every external program goes through a [`Toolbox`], so callers (and
//! tests) decide exactly which binaries run.
//!
//! # Example
//!
//! ```rust,ignore
//! use livecd_creator::{DirectoryRoot, LiveConfig, LivePipeline, Toolbox};
//!
//! let config = LiveConfig::load("live.toml".as_ref())?;
//! let mut root = DirectoryRoot::new("/var/tmp/maui/root", "/var/tmp/maui/root.img");
//! let output = LivePipeline::new(config, Toolbox::discover())?.run(&mut root)?;
//! println!("{}", output.artifact.display());
//! ```

pub mod artifact;
pub mod boot;
pub mod config;
pub mod error;
pub mod kernel;
pub mod manifest;
pub mod menu;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod render;
pub mod root;
pub mod stage;
pub mod tools;

pub use boot::{Architecture, BootStrategy};
pub use config::LiveConfig;
pub use error::{failure_kind, FailureKind, LiveError};
pub use kernel::KernelVariant;
pub use pipeline::{LivePipeline, RunOutput, RunState};
pub use root::{DirectoryRoot, LoopImageRoot, RootProvider};
pub use tools::{Tool, Toolbox};
