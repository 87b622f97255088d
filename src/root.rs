//! Access to the pre-built root filesystem.
//!
//! The pipeline never builds the root itself. It asks a [`RootProvider`] for
//! a mounted tree to read kernels and boot assets from, and for the raw image
//! file that ends up compressed inside `LiveOS/`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::tools::{Tool, Toolbox};

/// Source of the root filesystem for one run.
pub trait RootProvider {
    /// Make the root tree available and return its path.
    fn mount(&mut self) -> Result<PathBuf>;

    /// Release the tree. Must be safe to call when not mounted.
    fn unmount(&mut self) -> Result<()>;

    /// Raw filesystem image that is minimized and compressed.
    fn image_path(&self) -> &Path;

    /// Host tools [`RootProvider::mount`] and [`RootProvider::unmount`] run.
    fn host_tools(&self) -> &'static [Tool] {
        &[]
    }
}

/// A root that is already an unpacked directory, next to its image file.
///
/// Mounting is a no-op; useful when the host framework keeps the image
/// mounted itself, and in tests.
#[derive(Debug, Clone)]
pub struct DirectoryRoot {
    root: PathBuf,
    image: PathBuf,
}

impl DirectoryRoot {
    pub fn new(root: impl Into<PathBuf>, image: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            image: image.into(),
        }
    }
}

impl RootProvider for DirectoryRoot {
    fn mount(&mut self) -> Result<PathBuf> {
        if !self.root.is_dir() {
            bail!("root directory {} does not exist", self.root.display());
        }
        Ok(self.root.clone())
    }

    fn unmount(&mut self) -> Result<()> {
        Ok(())
    }

    fn image_path(&self) -> &Path {
        &self.image
    }
}

/// Loop-mounts an ext image on `mountpoint` with `mount -o loop`.
///
/// A mountpoint created by [`RootProvider::mount`] is removed again after a
/// successful unmount.
#[derive(Debug)]
pub struct LoopImageRoot {
    image: PathBuf,
    mountpoint: PathBuf,
    toolbox: Toolbox,
    mounted: bool,
    created_mountpoint: bool,
}

impl LoopImageRoot {
    pub const HOST_TOOLS: &'static [Tool] = &[Tool::Mount, Tool::Umount];

    pub fn new(image: impl Into<PathBuf>, mountpoint: impl Into<PathBuf>, toolbox: Toolbox) -> Self {
        Self {
            image: image.into(),
            mountpoint: mountpoint.into(),
            toolbox,
            mounted: false,
            created_mountpoint: false,
        }
    }

    fn remove_created_mountpoint(&mut self) {
        if !self.created_mountpoint {
            return;
        }
        match fs::remove_dir(&self.mountpoint) {
            Ok(()) => self.created_mountpoint = false,
            Err(e) => tracing::warn!(
                "could not remove mountpoint {}: {}",
                self.mountpoint.display(),
                e
            ),
        }
    }
}

impl RootProvider for LoopImageRoot {
    fn mount(&mut self) -> Result<PathBuf> {
        if self.mounted {
            return Ok(self.mountpoint.clone());
        }
        if !self.mountpoint.exists() {
            fs::create_dir_all(&self.mountpoint)
                .with_context(|| format!("creating mountpoint {}", self.mountpoint.display()))?;
            self.created_mountpoint = true;
        }

        tracing::info!(
            "Mounting {} on {}",
            self.image.display(),
            self.mountpoint.display()
        );
        let mounted = self.toolbox.cmd(Tool::Mount).and_then(|cmd| {
            cmd.args(["-o", "loop"])
                .arg_path(&self.image)
                .arg_path(&self.mountpoint)
                .error_msg(format!("mounting {}", self.image.display()))
                .run()
        });
        if let Err(e) = mounted {
            self.remove_created_mountpoint();
            return Err(e);
        }
        self.mounted = true;
        Ok(self.mountpoint.clone())
    }

    fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        self.toolbox
            .cmd(Tool::Umount)?
            .arg_path(&self.mountpoint)
            .error_msg(format!("unmounting {}", self.mountpoint.display()))
            .run()?;
        self.mounted = false;
        self.remove_created_mountpoint();
        Ok(())
    }

    fn image_path(&self) -> &Path {
        &self.image
    }

    fn host_tools(&self) -> &'static [Tool] {
        Self::HOST_TOOLS
    }
}

/// Keeps a [`RootProvider`] mounted until released or dropped.
pub struct MountGuard<'a> {
    provider: &'a mut dyn RootProvider,
    root: PathBuf,
    active: bool,
}

impl<'a> MountGuard<'a> {
    pub fn acquire(provider: &'a mut dyn RootProvider) -> Result<Self> {
        let root = provider.mount()?;
        Ok(Self {
            provider,
            root,
            active: true,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unmount now, reporting failure to the caller.
    pub fn release(mut self) -> Result<()> {
        self.active = false;
        self.provider.unmount()
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.provider.unmount() {
                tracing::warn!("could not unmount {}: {:#}", self.root.display(), e);
            }
        }
    }
}
