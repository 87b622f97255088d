//! Resolved option record for a live image run.
//!
//! Produced upstream (kickstart parsing is not this crate's concern) and read
//! here from TOML. Every field has a default, so an empty file describes a
//! plain `livecd` image with the stock boot menu.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artifact::package::PackFormat;
use crate::boot::Architecture;

/// ISO9660 volume identifiers are limited to 32 characters.
pub const MAX_LABEL_LEN: usize = 32;

pub const DEFAULT_KERNEL_ARGS: &str = "ro liveimg";
pub const DEFAULT_MENU: &str = "liveinst autoinst";
pub const DEFAULT_DISTRO_NAME: &str = "Maui";
pub const DEFAULT_TIMEOUT_SECS: u32 = 10;

/// syslinux caps its menu timeout at 35996 tenths of a second.
pub const MAX_TIMEOUT_SECS: u32 = 3599;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LiveConfig {
    /// Image name; the ISO is written as `<outdir>/<name>.iso`.
    pub name: String,
    /// Volume label. Defaults to `name`.
    pub fslabel: Option<String>,
    /// Product name shown in boot menus.
    pub distro_name: String,
    /// Boot menu timeout in seconds.
    pub timeout: u32,
    /// Kernel package to boot by default (`kernel-PAE` or just `PAE`).
    pub default_kernel: Option<String>,
    pub kernel_args: String,
    /// Menu specification, `short:long:extra;...` or `short short ...`.
    pub menu: String,
    pub outdir: PathBuf,
    /// Parent directory for staging trees. Defaults to the system temp dir.
    pub tmpdir: Option<PathBuf>,
    /// Wrap the ISO into this archive (relative to `outdir`).
    pub pack_to: Option<String>,
    /// `auto`, `x86_64`, `i386`, `i686`, `aarch64`, `arm*`.
    pub architecture: String,
    pub skip_compression: bool,
    pub skip_minimize: bool,
    /// Write a `<artifact>.sha256` sidecar.
    pub checksum: bool,
    /// Per-tool deadline; unset means wait indefinitely.
    pub tool_timeout_secs: Option<u64>,
    /// Use `/boot/<name>` instead of the per-version initrd lookup.
    pub alt_initrd_name: Option<String>,
    pub initramfs: InitramfsConfig,
    pub squashfs: SquashfsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InitramfsConfig {
    /// Rebuild the initramfs of the first kernel with dracut before staging.
    pub regenerate: bool,
    pub modules: Vec<String>,
    pub drivers: Vec<String>,
    /// Extra kernel modules appended to the stock driver list.
    pub extra_modules: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SquashfsConfig {
    pub compression: String,
    pub block_size: Option<String>,
    pub xattrs: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            name: "livecd".to_string(),
            fslabel: None,
            distro_name: DEFAULT_DISTRO_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            default_kernel: None,
            kernel_args: DEFAULT_KERNEL_ARGS.to_string(),
            menu: DEFAULT_MENU.to_string(),
            outdir: PathBuf::from("."),
            tmpdir: None,
            pack_to: None,
            architecture: "auto".to_string(),
            skip_compression: false,
            skip_minimize: false,
            checksum: true,
            tool_timeout_secs: None,
            alt_initrd_name: None,
            initramfs: InitramfsConfig::default(),
            squashfs: SquashfsConfig::default(),
        }
    }
}

impl Default for InitramfsConfig {
    fn default() -> Self {
        Self {
            regenerate: true,
            modules: ["dmsquash-live", "pollcdrom", "drm", "systemd"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            drivers: [
                "sr_mod",
                "sd_mod",
                "ide-cd",
                "cdrom",
                "ehci_hcd",
                "uhci_hcd",
                "ohci_hcd",
                "usb_storage",
                "usbhid",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
            extra_modules: Vec::new(),
        }
    }
}

impl Default for SquashfsConfig {
    fn default() -> Self {
        Self {
            compression: "xz".to_string(),
            block_size: None,
            xattrs: false,
        }
    }
}

impl LiveConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading live config '{}'", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("parsing live config '{}'", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid live config '{}'", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Volume label, falling back to the image name.
    pub fn label(&self) -> &str {
        self.fslabel.as_deref().unwrap_or(&self.name)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    pub fn iso_path(&self) -> PathBuf {
        self.outdir.join(format!("{}.iso", self.name))
    }

    pub fn pack_path(&self) -> Option<PathBuf> {
        self.pack_to.as_ref().map(|p| self.outdir.join(p))
    }

    /// Resolve the configured architecture, failing on unsupported ones.
    pub fn resolve_architecture(&self) -> Result<Architecture> {
        Architecture::resolve(&self.architecture)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name must not be empty");
        }
        if self.name.contains('/') {
            bail!("name must not contain '/', got '{}'", self.name);
        }

        let label = self.label();
        if label.is_empty() {
            bail!("fslabel must not be empty");
        }
        if label.len() > MAX_LABEL_LEN {
            bail!(
                "fslabel '{}' is {} characters; ISO volume ids are limited to {}",
                label,
                label.len(),
                MAX_LABEL_LEN
            );
        }
        if label.chars().any(char::is_whitespace) {
            bail!("fslabel '{}' must not contain whitespace", label);
        }

        if self.timeout > MAX_TIMEOUT_SECS {
            bail!(
                "timeout {} is above the bootloader limit of {} seconds",
                self.timeout,
                MAX_TIMEOUT_SECS
            );
        }

        if let Some(pack_to) = &self.pack_to {
            if PackFormat::from_target(Path::new(pack_to)).is_none() {
                bail!(
                    "pack_to '{}' has an unsupported extension (expected .tar, .tar.zst or .tzst)",
                    pack_to
                );
            }
        }

        self.resolve_architecture()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_config_uses_defaults() {
        let config = LiveConfig::from_toml_str("").unwrap();
        assert_eq!(config.name, "livecd");
        assert_eq!(config.label(), "livecd");
        assert_eq!(config.timeout, 10);
        assert_eq!(config.kernel_args, "ro liveimg");
        assert_eq!(config.menu, "liveinst autoinst");
        assert_eq!(config.distro_name, "Maui");
        assert!(config.checksum);
        assert!(config.initramfs.regenerate);
        assert_eq!(config.squashfs.compression, "xz");
    }

    #[test]
    fn parses_sections() {
        let config = LiveConfig::from_toml_str(
            r#"
name = "maui-live"
fslabel = "MAUI_LIVE"
timeout = 5
default_kernel = "PAE"
pack_to = "maui-live.tar.zst"
tool_timeout_secs = 600

[initramfs]
regenerate = false

[squashfs]
compression = "zstd"
block_size = "1M"
"#,
        )
        .unwrap();

        assert_eq!(config.label(), "MAUI_LIVE");
        assert_eq!(config.default_kernel.as_deref(), Some("PAE"));
        assert!(!config.initramfs.regenerate);
        assert_eq!(config.squashfs.block_size.as_deref(), Some("1M"));
        assert_eq!(config.tool_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(
            config.pack_path().unwrap(),
            PathBuf::from("./maui-live.tar.zst")
        );
        config.validate().unwrap();
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(LiveConfig::from_toml_str("bogus = 1").is_err());
        assert!(LiveConfig::from_toml_str("[initramfs]\nbogus = 1").is_err());
    }

    #[test]
    fn rejects_bad_labels() {
        let mut config = LiveConfig::default();
        config.fslabel = Some("A".repeat(33));
        assert!(config.validate().is_err());

        config.fslabel = Some("has space".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_timeout_above_bootloader_limit() {
        let mut config = LiveConfig::default();
        config.timeout = MAX_TIMEOUT_SECS;
        config.validate().unwrap();

        config.timeout = 429_496_730;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bootloader limit"));
    }

    #[test]
    fn rejects_unknown_pack_format() {
        let mut config = LiveConfig::default();
        config.pack_to = Some("image.rar".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported extension"));
    }

    #[test]
    fn rejects_unsupported_architecture() {
        let mut config = LiveConfig::default();
        config.architecture = "s390x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("live.toml");
        fs::write(&path, "name = \"\"").unwrap();

        let err = LiveConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("live.toml"));
    }
}
