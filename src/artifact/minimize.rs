//! Root image resparsing and the `osmin.img` minimizer.
//!
//! `osmin.img` lets the live runtime rebuild a minimal copy of the root
//! without reading the whole image: a device-mapper snapshot of the image is
//! shrunk to the filesystem's minimum size, and only the copy-on-write blocks
//! that shrink produced are kept, squashed.
//!
//! Every loop device and snapshot set up here is torn down by a guard, so a
//! failure halfway through leaves no devices behind.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::squashfs::{build_squashfs, SquashfsOptions};
use crate::error::LiveError;
use crate::process::Cmd;
use crate::tools::{Tool, Toolbox};

/// Name of the minimizer image inside `LiveOS/`.
pub const OSMIN_NAME: &str = "osmin.img";

/// Sparse size of the snapshot's copy-on-write file.
pub const COW_SIZE: u64 = 64 * 1024 * 1024;

/// File name of the COW file inside `osmin.img`; the live initramfs
/// loop-mounts `<osmin.img>/osmin`.
pub const COW_NAME: &str = "osmin";

const SECTOR_SIZE: u64 = 512;

static SNAPSHOT_SEQ: AtomicUsize = AtomicUsize::new(0);

fn minimize_err(e: anyhow::Error) -> anyhow::Error {
    LiveError::MinimizeFailed {
        detail: format!("{:#}", e),
    }
    .into()
}

fn tool(toolbox: &Toolbox, tool: Tool) -> Result<Cmd> {
    toolbox.cmd(tool).map_err(minimize_err)
}

/// Block geometry from `dumpe2fs -h` output.
pub fn parse_block_geometry(dumpe2fs: &str) -> Option<(u64, u64)> {
    let field = |name: &str| {
        dumpe2fs.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim() == name {
                value.trim().parse::<u64>().ok()
            } else {
                None
            }
        })
    };
    Some((field("Block count")?, field("Block size")?))
}

/// Bytes used in the COW device, from `dmsetup status` of a snapshot.
///
/// The status line reads `<start> <len> snapshot <used>/<total> <meta>`,
/// with sector counts.
pub fn parse_cow_used(status: &str) -> Option<u64> {
    let token = status.split_whitespace().nth(3)?;
    let used = token.split('/').next()?.parse::<u64>().ok()?;
    Some(used * SECTOR_SIZE)
}

/// Filesystem size of an ext image, in bytes.
pub fn filesystem_size(toolbox: &Toolbox, image: &Path) -> Result<u64> {
    let out = tool(toolbox, Tool::Dumpe2fs)?
        .arg("-h")
        .arg_path(image)
        .run()
        .map_err(minimize_err)?;
    let (count, size) = parse_block_geometry(&out.stdout).ok_or_else(|| {
        minimize_err(anyhow::anyhow!(
            "could not read block geometry of {}",
            image.display()
        ))
    })?;
    Ok(count * size)
}

fn fsck(toolbox: &Toolbox, image: &Path) -> Result<()> {
    // e2fsck exits 1 when it corrected something; only >1 is a failure.
    let result = tool(toolbox, Tool::E2fsck)?
        .args(["-f", "-y"])
        .arg_path(image)
        .allow_fail()
        .run()
        .map_err(minimize_err)?;
    if result.code() > 1 {
        return Err(minimize_err(anyhow::anyhow!(
            "e2fsck of {} failed (exit code {}): {}",
            image.display(),
            result.code(),
            result.stderr_trimmed()
        )));
    }
    Ok(())
}

/// Shrink the image to its minimum, truncate away the freed tail, then grow
/// it back sparse.
///
/// Returns the minimum filesystem size in bytes.
pub fn resparse(toolbox: &Toolbox, image: &Path) -> Result<u64> {
    let original = fs::metadata(image)
        .with_context(|| format!("reading size of {}", image.display()))?
        .len();

    fsck(toolbox, image)?;
    tool(toolbox, Tool::Resize2fs)?
        .arg("-M")
        .arg_path(image)
        .error_msg(format!("resize2fs -M failed for {}", image.display()))
        .run()
        .map_err(minimize_err)?;

    let minimal = filesystem_size(toolbox, image)?;
    tracing::info!(
        "Resparsing {}: minimum size {} MiB",
        image.display(),
        minimal / (1024 * 1024)
    );

    let file = OpenOptions::new()
        .write(true)
        .open(image)
        .with_context(|| format!("opening {}", image.display()))?;
    file.set_len(minimal)
        .with_context(|| format!("truncating {}", image.display()))?;
    file.set_len(original)
        .with_context(|| format!("regrowing {}", image.display()))?;
    drop(file);

    tool(toolbox, Tool::Resize2fs)?
        .arg_path(image)
        .error_msg(format!("resize2fs failed to grow {}", image.display()))
        .run()
        .map_err(minimize_err)?;

    Ok(minimal)
}

/// A loop device detached on drop.
struct LoopDevice<'a> {
    toolbox: &'a Toolbox,
    device: String,
}

impl<'a> LoopDevice<'a> {
    fn attach(toolbox: &'a Toolbox, file: &Path, read_only: bool) -> Result<Self> {
        let mut cmd = tool(toolbox, Tool::Losetup)?.args(["-f", "--show"]);
        if read_only {
            cmd = cmd.arg("-r");
        }
        let out = cmd.arg_path(file).run().map_err(minimize_err)?;
        let device = out.stdout_trimmed().to_string();
        if device.is_empty() {
            return Err(minimize_err(anyhow::anyhow!(
                "losetup returned no device for {}",
                file.display()
            )));
        }
        Ok(Self { toolbox, device })
    }
}

impl Drop for LoopDevice<'_> {
    fn drop(&mut self) {
        let result = self
            .toolbox
            .cmd(Tool::Losetup)
            .and_then(|cmd| cmd.arg("-d").arg(&self.device).run());
        if let Err(e) = result {
            tracing::warn!("could not detach {}: {:#}", self.device, e);
        }
    }
}

/// A device-mapper snapshot removed on drop.
struct Snapshot<'a> {
    toolbox: &'a Toolbox,
    name: String,
}

impl<'a> Snapshot<'a> {
    fn create(toolbox: &'a Toolbox, origin: &str, cow: &str, sectors: u64) -> Result<Self> {
        let name = format!(
            "imgcreate-{}-{}",
            std::process::id(),
            SNAPSHOT_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let table = format!("0 {} snapshot {} {} p 8", sectors, origin, cow);
        tool(toolbox, Tool::Dmsetup)?
            .args(["create", name.as_str(), "--table", table.as_str()])
            .error_msg("could not create snapshot device")
            .run()
            .map_err(minimize_err)?;
        Ok(Self { toolbox, name })
    }

    fn device(&self) -> String {
        format!("/dev/mapper/{}", self.name)
    }

    fn cow_used(&self) -> Result<u64> {
        let out = tool(self.toolbox, Tool::Dmsetup)?
            .args(["status", self.name.as_str()])
            .run()
            .map_err(minimize_err)?;
        parse_cow_used(out.stdout_trimmed()).ok_or_else(|| {
            minimize_err(anyhow::anyhow!(
                "unexpected snapshot status '{}'",
                out.stdout_trimmed()
            ))
        })
    }
}

impl Drop for Snapshot<'_> {
    fn drop(&mut self) {
        let result = self
            .toolbox
            .cmd(Tool::Dmsetup)
            .and_then(|cmd| cmd.args(["remove", self.name.as_str()]).run());
        if let Err(e) = result {
            tracing::warn!("could not remove snapshot {}: {:#}", self.name, e);
        }
    }
}

/// Build `osmin.img` at `output` from `image`, shrunk to `minimal_size`.
///
/// `scratch_dir` holds the temporary COW file.
pub fn create_image_minimizer(
    toolbox: &Toolbox,
    output: &Path,
    image: &Path,
    minimal_size: u64,
    scratch_dir: &Path,
    squashfs: &SquashfsOptions,
) -> Result<()> {
    let image_size = fs::metadata(image)
        .with_context(|| format!("reading size of {}", image.display()))?
        .len();

    let cow_dir = tempfile::Builder::new()
        .prefix("osmin-")
        .tempdir_in(scratch_dir)
        .with_context(|| format!("creating COW directory in {}", scratch_dir.display()))?;
    let cow_path = cow_dir.path().join(COW_NAME);
    let cow = fs::File::create(&cow_path)
        .with_context(|| format!("creating COW file {}", cow_path.display()))?;
    cow.set_len(COW_SIZE).context("sizing COW file")?;

    tracing::info!("Creating image minimizer {}", output.display());
    let used = {
        let origin = LoopDevice::attach(toolbox, image, true)?;
        let cow_dev = LoopDevice::attach(toolbox, &cow_path, false)?;
        let snapshot = Snapshot::create(
            toolbox,
            &origin.device,
            &cow_dev.device,
            image_size / SECTOR_SIZE,
        )?;

        tool(toolbox, Tool::Resize2fs)?
            .arg(snapshot.device())
            .arg(format!("{}K", minimal_size / 1024))
            .error_msg("resize2fs of the snapshot failed")
            .run()
            .map_err(minimize_err)?;

        // Dropped in reverse order: snapshot first, then both loop devices.
        let used = snapshot.cow_used()?;
        used
    };

    cow.set_len(used).context("truncating COW file")?;
    drop(cow);
    build_squashfs(toolbox, &cow_path, output, squashfs).map_err(|e| {
        LiveError::MinimizeFailed {
            detail: format!("{:#}", e),
        }
    })?;
    Ok(())
}
