//! Preflight checks for build validation.
//!
//! Validates that the host has every external tool the configured run will
//! invoke, before anything is mounted or staged. Optional tools (`isohybrid`,
//! `implantisomd5`) are reported as warnings only.
//!
//! # Example
//!
//! ```rust,ignore
//! use livecd_creator::preflight::check_host_tools;
//! use livecd_creator::{LiveConfig, Toolbox};
//!
//! let config = LiveConfig::load("live.toml".as_ref())?;
//! check_host_tools(&config, &Toolbox::discover(), &[])?;
//! ```

use anyhow::{bail, Result};

use crate::config::LiveConfig;
use crate::tools::{Tool, Toolbox};

/// Tools that degrade the image when missing but never fail the run.
pub const OPTIONAL_TOOLS: &[Tool] = &[Tool::Isohybrid, Tool::Implantisomd5];

/// Mandatory tools for a run with `config`.
pub fn required_tools(config: &LiveConfig) -> Vec<Tool> {
    let mut tools = vec![Tool::Genisoimage];
    if !config.skip_compression {
        tools.push(Tool::Mksquashfs);
    }
    if !config.skip_minimize {
        tools.extend([
            Tool::E2fsck,
            Tool::Resize2fs,
            Tool::Dumpe2fs,
            Tool::Losetup,
            Tool::Dmsetup,
        ]);
        // osmin.img is always squashed
        if config.skip_compression {
            tools.push(Tool::Mksquashfs);
        }
    }
    if config.initramfs.regenerate {
        tools.push(Tool::Chroot);
    }
    tools
}

/// Check that specific tools are available.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(toolbox: &Toolbox, tools: &[Tool]) -> Result<()> {
    let missing = toolbox.missing(tools);
    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|t| format!("  {} (install: {})", t.binary(), t.package()))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }
    Ok(())
}

/// Check everything a run with `config` needs.
///
/// `provider_tools` are the tools the root provider runs to mount the root
/// (see [`crate::root::RootProvider::host_tools`]).
pub fn check_host_tools(
    config: &LiveConfig,
    toolbox: &Toolbox,
    provider_tools: &[Tool],
) -> Result<()> {
    for tool in toolbox.missing(OPTIONAL_TOOLS) {
        tracing::warn!(
            "{} not found (install: {}); continuing without it",
            tool.binary(),
            tool.package()
        );
    }
    if !is_root() {
        tracing::warn!("not running as root; loop devices and device-mapper will likely fail");
    }
    let mut tools = required_tools(config);
    for tool in provider_tools {
        if !tools.contains(tool) {
            tools.push(*tool);
        }
    }
    check_required_tools(toolbox, &tools)
}

/// Effective uid is 0.
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
