//! One live image run, from mounted root to published ISO.
//!
//! ```text
//! Resolving -> Rendering -> Staging -> Compressing -> Assembling -> Done
//!      \___________\___________\___________\______________\_____-> Failed(kind)
//! ```
//!
//! The staging directory is created once, threaded through every step and
//! removed before the run enters `Done` or `Failed`, whatever happened. The
//! root stays mounted only while kernels and boot assets are read from it.

pub mod lock;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::artifact::checksum::write_sidecar;
use crate::artifact::iso::{assemble_iso, ImplantOutcome, IsoOptions};
use crate::artifact::minimize::{create_image_minimizer, resparse, OSMIN_NAME};
use crate::artifact::package::pack_iso;
use crate::artifact::squashfs::{stage_root_image, SquashfsOptions};
use crate::boot::{Architecture, BootContext};
use crate::config::LiveConfig;
use crate::error::{failure_kind, FailureKind};
use crate::kernel::initramfs::regenerate_initramfs;
use crate::kernel::inventory::{BootDirInventory, KernelInventory};
use crate::kernel::{
    enumerate, resolve_kernels, resolve_variants, KernelVariant, ResolveOptions,
};
use crate::manifest::{
    media_check_label, now_utc_compact, tree_listing, BuildManifest, ManifestKernel,
};
use crate::menu::MenuSpecification;
use crate::render::{BootConfig, BootOptions};
use crate::root::{MountGuard, RootProvider};
use crate::stage::{has_checkisomd5, StagingDirectory, LIVEOS_DIR};
use crate::tools::Toolbox;

use lock::OutputLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Resolving,
    Rendering,
    Staging,
    Compressing,
    Assembling,
    Done,
    Failed(FailureKind),
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }
}

/// What a successful run left in the output directory.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The ISO, or the archive it was packed into.
    pub artifact: PathBuf,
    pub checksum: Option<PathBuf>,
    pub manifest: PathBuf,
    pub efi_enabled: bool,
    pub media_check: ImplantOutcome,
    pub variants: Vec<KernelVariant>,
}

pub struct LivePipeline {
    config: LiveConfig,
    toolbox: Toolbox,
    architecture: Architecture,
    inventory: Box<dyn KernelInventory>,
    history: Vec<RunState>,
}

impl LivePipeline {
    /// Validate `config` and resolve its architecture.
    ///
    /// An unsupported architecture fails here, before anything is mounted.
    pub fn new(config: LiveConfig, toolbox: Toolbox) -> Result<Self> {
        config.validate()?;
        let architecture = config.resolve_architecture()?;
        let toolbox = match config.tool_timeout() {
            Some(timeout) => toolbox.with_timeout(Some(timeout)),
            None => toolbox,
        };
        Ok(Self {
            config,
            toolbox,
            architecture,
            inventory: Box::new(BootDirInventory),
            history: Vec::new(),
        })
    }

    /// Replace the kernel inventory (the default scans `/boot`).
    pub fn with_inventory(mut self, inventory: Box<dyn KernelInventory>) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    /// Current state; `None` before the first run.
    pub fn state(&self) -> Option<RunState> {
        self.history.last().copied()
    }

    /// Every state the last run went through, in order.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("run state {:?} -> {:?}", self.state(), next);
        self.history.push(next);
    }

    /// Resolve kernels in an already available `root` and render the boot
    /// configuration without staging anything.
    pub fn render(&self, root: &Path) -> Result<BootConfig> {
        let variants = resolve_kernels(
            root,
            self.inventory.as_ref(),
            &ResolveOptions {
                default_kernel: self.config.default_kernel.as_deref(),
                alt_initrd_name: self.config.alt_initrd_name.as_deref(),
                regenerated: None,
            },
        )?;
        let menu = MenuSpecification::parse(&self.config.menu);
        let options = BootOptions::from_config(&self.config, root);
        let plan = self.architecture.strategy()?.prepare(&BootContext {
            root,
            variants: &variants,
            menu: &menu,
            options: &options,
            has_checkisomd5: has_checkisomd5(root, &self.toolbox),
        })?;
        Ok(plan.config)
    }

    /// Run the whole pipeline against `provider`.
    pub fn run(&mut self, provider: &mut dyn RootProvider) -> Result<RunOutput> {
        self.history.clear();
        let started = now_utc_compact();
        self.transition(RunState::Resolving);

        let mut staging = None;
        let result = self.execute(provider, &mut staging, &started);
        if let Some(staging) = staging.take() {
            staging.close();
        }

        match &result {
            Ok(output) => {
                tracing::info!("Live image ready: {}", output.artifact.display());
                self.transition(RunState::Done);
            }
            Err(e) => {
                let kind = failure_kind(e);
                tracing::error!("live image run failed ({:?}): {:#}", kind, e);
                self.transition(RunState::Failed(kind));
            }
        }
        result
    }

    fn execute(
        &mut self,
        provider: &mut dyn RootProvider,
        staging_slot: &mut Option<StagingDirectory>,
        started: &str,
    ) -> Result<RunOutput> {
        let _lock = OutputLock::acquire(&self.config.outdir, &self.config.name)?;
        let image = provider.image_path().to_path_buf();
        let mount = MountGuard::acquire(provider)?;
        let root = mount.root().to_path_buf();

        let versions = enumerate(&root, self.inventory.as_ref())?;
        let mut regenerated = None;
        if self.config.initramfs.regenerate {
            if let Some(version) = versions.values().flatten().next() {
                regenerate_initramfs(&root, &self.toolbox, &self.config.initramfs, version)?;
                regenerated = Some(version.as_str());
            }
        }
        let variants = resolve_variants(
            &root,
            &versions,
            &ResolveOptions {
                default_kernel: self.config.default_kernel.as_deref(),
                alt_initrd_name: self.config.alt_initrd_name.as_deref(),
                regenerated,
            },
        )?;

        self.transition(RunState::Rendering);
        let strategy = self.architecture.strategy()?;
        tracing::info!("Preparing {} boot for {} kernel(s)", strategy.name(), variants.len());
        let menu = MenuSpecification::parse(&self.config.menu);
        let options = BootOptions::from_config(&self.config, &root);
        let plan = strategy.prepare(&BootContext {
            root: &root,
            variants: &variants,
            menu: &menu,
            options: &options,
            has_checkisomd5: has_checkisomd5(&root, &self.toolbox),
        })?;

        self.transition(RunState::Staging);
        let staging =
            staging_slot.insert(StagingDirectory::create(self.config.tmpdir.as_deref())?);
        let staged = strategy.stage(&plan, &variants, staging)?;
        mount.release().context("releasing the root filesystem")?;

        self.transition(RunState::Compressing);
        let liveos = staging.ensure_dir(LIVEOS_DIR)?;
        let squashfs = SquashfsOptions::from(&self.config.squashfs);
        if !self.config.skip_minimize {
            let minimal = resparse(&self.toolbox, &image)?;
            let scratch = self
                .config
                .tmpdir
                .clone()
                .unwrap_or_else(std::env::temp_dir);
            create_image_minimizer(
                &self.toolbox,
                &liveos.join(OSMIN_NAME),
                &image,
                minimal,
                &scratch,
                &squashfs,
            )?;
        }
        stage_root_image(
            &self.toolbox,
            &image,
            &liveos,
            self.config.skip_compression,
            &squashfs,
        )?;

        self.transition(RunState::Assembling);
        let (iso, media_check) = assemble_iso(
            &self.toolbox,
            staging.path(),
            &self.config.iso_path(),
            &IsoOptions {
                label: self.config.label(),
                boot_args: &staged.mkisofs_args,
            },
        )?;
        let iso_tree = tree_listing(staging.path())?;

        let artifact = match self.config.pack_path() {
            Some(target) => pack_iso(&iso, &target)?,
            None => iso,
        };
        let (checksum, sha256) = if self.config.checksum {
            let (sidecar, digest) = write_sidecar(&artifact)?;
            (Some(sidecar), Some(digest))
        } else {
            (None, None)
        };

        let manifest = BuildManifest {
            name: self.config.name.clone(),
            label: self.config.label().to_string(),
            architecture: self.architecture.name().to_string(),
            started: started.to_string(),
            finished: now_utc_compact(),
            kernels: variants.iter().map(ManifestKernel::from).collect(),
            efi: staged.efi_enabled,
            media_check: media_check_label(&media_check),
            artifact: artifact.clone(),
            sha256,
            iso_tree,
        }
        .write(&self.config.outdir)?;

        Ok(RunOutput {
            artifact,
            checksum,
            manifest,
            efi_enabled: staged.efi_enabled,
            media_check,
            variants,
        })
    }
}
