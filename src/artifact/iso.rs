//! ISO image mastering.
//!
//! Provides a wrapper around `genisoimage` for creating bootable ISO images,
//! followed by the optional post-processing steps:
//!
//! 1. `genisoimage` writes `<name>.iso.tmp` (fatal on failure)
//! 2. `isohybrid -partok` makes it USB-bootable (skipped if not installed,
//!    fatal if it fails)
//! 3. `implantisomd5` embeds a media checksum (never fatal)
//! 4. the temporary file is renamed to `<name>.iso`
//!
//! A failed run never leaves a `<name>.iso` behind.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::filesystem::{remove_if_exists, tmp_path};
use crate::error::LiveError;
use crate::tools::{Tool, Toolbox};

/// Joliet and Rock Ridge flags every image gets.
pub const BASE_FLAGS: &[&str] = &["-J", "-r", "-hide-rr-moved", "-hide-joliet-trans-tbl"];

/// Options for building an ISO image.
#[derive(Debug, Clone)]
pub struct IsoOptions<'a> {
    /// Volume label (used for boot device detection via root=live:LABEL=X).
    pub label: &'a str,

    /// Architecture boot flags, e.g. the isolinux El Torito setup.
    pub boot_args: &'a [String],
}

/// `genisoimage` arguments after the program name.
pub fn genisoimage_args(iso_root: &Path, output: &Path, options: &IsoOptions) -> Vec<String> {
    let mut args: Vec<String> = BASE_FLAGS.iter().map(|f| f.to_string()).collect();
    args.push("-V".to_string());
    args.push(options.label.to_string());
    args.push("-o".to_string());
    args.push(output.to_string_lossy().into_owned());
    args.extend(options.boot_args.iter().cloned());
    args.push(iso_root.to_string_lossy().into_owned());
    args
}

/// Run `genisoimage` over a staged tree.
pub fn master_iso(
    toolbox: &Toolbox,
    iso_root: &Path,
    output: &Path,
    options: &IsoOptions,
) -> Result<()> {
    let cmd = toolbox
        .cmd(Tool::Genisoimage)
        .map_err(|e| LiveError::IsoMasteringFailed {
            detail: format!("{:#}", e),
        })?;

    tracing::info!("Mastering ISO {} (label {})", output.display(), options.label);
    cmd.args(genisoimage_args(iso_root, output, options))
        .error_msg("genisoimage failed")
        .run()
        .map_err(|e| LiveError::IsoMasteringFailed {
            detail: format!("{:#}", e),
        })?;

    if !output.is_file() {
        return Err(LiveError::IsoMasteringFailed {
            detail: format!("genisoimage did not write {}", output.display()),
        }
        .into());
    }
    Ok(())
}

/// Make the ISO bootable from USB media.
///
/// Returns `Ok(false)` when `isohybrid` is not installed.
pub fn make_hybrid(toolbox: &Toolbox, iso: &Path) -> Result<bool> {
    let Some(isohybrid) = toolbox.get(Tool::Isohybrid) else {
        tracing::warn!("isohybrid not installed; the ISO will not be USB-bootable");
        return Ok(false);
    };

    toolbox
        .cmd_for(isohybrid)
        .arg("-partok")
        .arg_path(iso)
        .error_msg("isohybrid failed")
        .run()
        .map_err(|e| LiveError::HybridPostprocessFailed {
            detail: format!("{:#}", e),
        })?;
    Ok(true)
}

/// Result of checksum implantation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImplantOutcome {
    Implanted,
    ToolMissing,
    Failed(String),
}

/// Embed an isomd5sum. Never fails the run.
pub fn implant_md5sum(toolbox: &Toolbox, iso: &Path) -> ImplantOutcome {
    let Some(implant) = toolbox.get(Tool::Implantisomd5) else {
        tracing::warn!("isomd5sum not installed; not setting up mediacheck");
        return ImplantOutcome::ToolMissing;
    };

    match toolbox.cmd_for(implant).arg_path(iso).run() {
        Ok(_) => ImplantOutcome::Implanted,
        Err(e) => {
            tracing::warn!("implantisomd5 failed; media check will not work: {:#}", e);
            ImplantOutcome::Failed(format!("{:#}", e))
        }
    }
}

/// Master, post-process and publish `<output>`.
///
/// Returns the final ISO path along with the checksum implant outcome.
pub fn assemble_iso(
    toolbox: &Toolbox,
    iso_root: &Path,
    output: &Path,
    options: &IsoOptions,
) -> Result<(PathBuf, ImplantOutcome)> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let tmp = tmp_path(output);
    remove_if_exists(&tmp);

    let result = (|| {
        master_iso(toolbox, iso_root, &tmp, options)?;
        make_hybrid(toolbox, &tmp)?;
        let implant = implant_md5sum(toolbox, &tmp);
        fs::rename(&tmp, output).with_context(|| {
            format!("renaming {} to {}", tmp.display(), output.display())
        })?;
        Ok(implant)
    })();

    match result {
        Ok(implant) => Ok((output.to_path_buf(), implant)),
        Err(e) => {
            remove_if_exists(&tmp);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{failure_kind, FailureKind};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Fake genisoimage: writes "iso" to the path after `-o`.
    const FAKE_GENISOIMAGE: &str = "#!/bin/sh
while [ $# -gt 0 ]; do
  if [ \"$1\" = \"-o\" ]; then shift; echo iso > \"$1\"; fi
  shift
done
";

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn options<'a>(boot: &'a [String]) -> IsoOptions<'a> {
        IsoOptions {
            label: "MAUI_LIVE",
            boot_args: boot,
        }
    }

    #[test]
    fn args_order() {
        let boot = vec!["-b".to_string(), "isolinux/isolinux.bin".to_string()];
        let args = genisoimage_args(Path::new("/iso"), Path::new("/out/a.iso"), &options(&boot));
        assert_eq!(
            args,
            vec![
                "-J",
                "-r",
                "-hide-rr-moved",
                "-hide-joliet-trans-tbl",
                "-V",
                "MAUI_LIVE",
                "-o",
                "/out/a.iso",
                "-b",
                "isolinux/isolinux.bin",
                "/iso"
            ]
        );
    }

    #[test]
    fn assembles_without_optional_tools() {
        let temp = TempDir::new().unwrap();
        let gen = script(temp.path(), "genisoimage", FAKE_GENISOIMAGE);
        let toolbox = Toolbox::empty().with_tool(Tool::Genisoimage, gen);
        let out = temp.path().join("out/maui.iso");

        let (iso, implant) = assemble_iso(&toolbox, temp.path(), &out, &options(&[])).unwrap();
        assert_eq!(iso, out);
        assert!(out.is_file());
        assert!(!tmp_path(&out).exists());
        assert_eq!(implant, ImplantOutcome::ToolMissing);
    }

    #[test]
    fn mastering_failure() {
        let temp = TempDir::new().unwrap();
        let toolbox = Toolbox::empty().with_tool(Tool::Genisoimage, "/bin/false");
        let out = temp.path().join("maui.iso");

        let err = assemble_iso(&toolbox, temp.path(), &out, &options(&[])).unwrap_err();
        assert_eq!(failure_kind(&err), FailureKind::IsoMasteringFailed);
        assert!(!out.exists());
    }

    #[test]
    fn hybrid_failure_leaves_no_iso() {
        let temp = TempDir::new().unwrap();
        let gen = script(temp.path(), "genisoimage", FAKE_GENISOIMAGE);
        let toolbox = Toolbox::empty()
            .with_tool(Tool::Genisoimage, gen)
            .with_tool(Tool::Isohybrid, "/bin/false");
        let out = temp.path().join("maui.iso");

        let err = assemble_iso(&toolbox, temp.path(), &out, &options(&[])).unwrap_err();
        assert_eq!(failure_kind(&err), FailureKind::HybridPostprocessFailed);
        assert!(!out.exists());
        assert!(!tmp_path(&out).exists());
    }

    #[test]
    fn implant_failure_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let gen = script(temp.path(), "genisoimage", FAKE_GENISOIMAGE);
        let toolbox = Toolbox::empty()
            .with_tool(Tool::Genisoimage, gen)
            .with_tool(Tool::Isohybrid, "/bin/true")
            .with_tool(Tool::Implantisomd5, "/bin/false");
        let out = temp.path().join("maui.iso");

        let (_, implant) = assemble_iso(&toolbox, temp.path(), &out, &options(&[])).unwrap();
        assert!(matches!(implant, ImplantOutcome::Failed(_)));
        assert!(out.is_file());
    }
}
