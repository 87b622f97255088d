//! SHA-256 sidecar files for published artifacts.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Hex digest and size of a file, read in 1 MiB chunks.
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let n = r
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

/// Path of the sidecar for `artifact`: `<name>.sha256`.
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".sha256");
    artifact.with_file_name(name)
}

/// Write `<hash>  <filename>` next to `artifact`, in `sha256sum -c` format.
///
/// Returns the sidecar path and the digest.
pub fn write_sidecar(artifact: &Path) -> Result<(PathBuf, String)> {
    let (digest, size) = sha256_file(artifact)?;
    let file_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar = sidecar_path(artifact);
    fs::write(&sidecar, format!("{}  {}\n", digest, file_name))
        .with_context(|| format!("Failed to write {}", sidecar.display()))?;
    tracing::info!("{} ({} bytes) sha256 {}", file_name, size, digest);
    Ok((sidecar, digest))
}
