//! External tool discovery.
//!
//! Each black-box binary the pipeline calls is probed once into a
//! [`Toolbox`]. A probe yields `Option<ToolPath>`: callers branch on presence
//! instead of catching lookup failures. Tests build a toolbox by hand and point
//! entries at fake scripts.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::Cmd;

/// External binaries used by a live image run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    Genisoimage,
    Isohybrid,
    Implantisomd5,
    Mksquashfs,
    Resize2fs,
    E2fsck,
    Dumpe2fs,
    Losetup,
    Dmsetup,
    Chroot,
    Mount,
    Umount,
}

impl Tool {
    pub const ALL: &'static [Tool] = &[
        Tool::Genisoimage,
        Tool::Isohybrid,
        Tool::Implantisomd5,
        Tool::Mksquashfs,
        Tool::Resize2fs,
        Tool::E2fsck,
        Tool::Dumpe2fs,
        Tool::Losetup,
        Tool::Dmsetup,
        Tool::Chroot,
        Tool::Mount,
        Tool::Umount,
    ];

    /// Binary name looked up in PATH.
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Genisoimage => "genisoimage",
            Tool::Isohybrid => "isohybrid",
            Tool::Implantisomd5 => "implantisomd5",
            Tool::Mksquashfs => "mksquashfs",
            Tool::Resize2fs => "resize2fs",
            Tool::E2fsck => "e2fsck",
            Tool::Dumpe2fs => "dumpe2fs",
            Tool::Losetup => "losetup",
            Tool::Dmsetup => "dmsetup",
            Tool::Chroot => "chroot",
            Tool::Mount => "mount",
            Tool::Umount => "umount",
        }
    }

    /// Package providing the binary, for install hints.
    pub fn package(self) -> &'static str {
        match self {
            Tool::Genisoimage => "genisoimage",
            Tool::Isohybrid => "syslinux",
            Tool::Implantisomd5 => "isomd5sum",
            Tool::Mksquashfs => "squashfs-tools",
            Tool::Resize2fs | Tool::E2fsck | Tool::Dumpe2fs => "e2fsprogs",
            Tool::Losetup | Tool::Mount | Tool::Umount => "util-linux",
            Tool::Dmsetup => "device-mapper",
            Tool::Chroot => "coreutils",
        }
    }

    /// Locations checked when the binary is not in PATH.
    fn fallback_locations(self) -> &'static [&'static str] {
        match self {
            Tool::Implantisomd5 => &[
                "/usr/bin/implantisomd5",
                "/usr/lib/anaconda-runtime/implantisomd5",
            ],
            Tool::E2fsck => &["/sbin/e2fsck"],
            Tool::Resize2fs => &["/sbin/resize2fs"],
            Tool::Dumpe2fs => &["/sbin/dumpe2fs"],
            Tool::Losetup => &["/sbin/losetup"],
            Tool::Dmsetup => &["/sbin/dmsetup"],
            _ => &[],
        }
    }
}

/// Resolved location of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPath(PathBuf);

impl ToolPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Probe a single tool: PATH first, then the known fallback locations.
pub fn probe(tool: Tool) -> Option<ToolPath> {
    if let Ok(path) = which::which(tool.binary()) {
        return Some(ToolPath(path));
    }
    tool.fallback_locations()
        .iter()
        .map(Path::new)
        .find(|p| p.is_file())
        .map(ToolPath::new)
}

/// The set of external tools available to one run.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    tools: BTreeMap<Tool, ToolPath>,
    timeout: Option<Duration>,
}

impl Toolbox {
    /// A toolbox with nothing in it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Probe every known tool on the host.
    pub fn discover() -> Self {
        let mut toolbox = Self::empty();
        for &tool in Tool::ALL {
            match probe(tool) {
                Some(path) => {
                    tracing::debug!("found {} at {}", tool.binary(), path.path().display());
                    toolbox.tools.insert(tool, path);
                }
                None => tracing::debug!("{} not found", tool.binary()),
            }
        }
        toolbox
    }

    pub fn with_tool(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(tool, ToolPath::new(path));
        self
    }

    pub fn without(mut self, tool: Tool) -> Self {
        self.tools.remove(&tool);
        self
    }

    /// Bound every invocation made through [`Toolbox::cmd`].
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn get(&self, tool: Tool) -> Option<&ToolPath> {
        self.tools.get(&tool)
    }

    pub fn has(&self, tool: Tool) -> bool {
        self.tools.contains_key(&tool)
    }

    pub fn require(&self, tool: Tool) -> Result<&ToolPath> {
        match self.get(tool) {
            Some(path) => Ok(path),
            None => bail!(
                "{} not found. Install {}.",
                tool.binary(),
                tool.package()
            ),
        }
    }

    /// Command builder for a required tool, with the run-wide timeout applied.
    pub fn cmd(&self, tool: Tool) -> Result<Cmd> {
        let path = self.require(tool)?;
        Ok(Cmd::new(path.path()).timeout(self.timeout))
    }

    /// Command builder for an already probed tool.
    pub fn cmd_for(&self, path: &ToolPath) -> Cmd {
        Cmd::new(path.path()).timeout(self.timeout)
    }

    /// Tools from `wanted` that are not available.
    pub fn missing<'a>(&self, wanted: impl IntoIterator<Item = &'a Tool>) -> Vec<Tool> {
        wanted.into_iter().copied().filter(|t| !self.has(*t)).collect()
    }
}
