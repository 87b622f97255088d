//! Exclusive lock on a run's output name.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::LiveError;

/// Held for the whole run; the lock file is removed on drop.
#[derive(Debug)]
pub struct OutputLock {
    _file: File,
    path: PathBuf,
}

impl OutputLock {
    /// Lock file for `name` in `outdir`: `<outdir>/.<name>.lock`.
    pub fn path_for(outdir: &Path, name: &str) -> PathBuf {
        outdir.join(format!(".{}.lock", name))
    }

    /// Take the lock, failing with [`LiveError::OutputLocked`] on contention.
    pub fn acquire(outdir: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(outdir)
            .with_context(|| format!("Failed to create output directory: {}", outdir.display()))?;
        let lock_path = Self::path_for(outdir, name);

        // Do not unlink a stale lock file first: a still-locked file could be
        // replaced by a fresh one and two runs would both hold "the" lock.
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

        if lock_file.try_lock_exclusive().is_err() {
            drop(lock_file);
            return Err(LiveError::OutputLocked { lock: lock_path }.into());
        }

        Ok(OutputLock {
            _file: lock_file,
            path: lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{failure_kind, FailureKind};
    use tempfile::TempDir;

    #[test]
    fn second_lock_is_refused() {
        let temp = TempDir::new().unwrap();
        let first = OutputLock::acquire(temp.path(), "maui").unwrap();
        assert_eq!(first.path(), temp.path().join(".maui.lock"));

        let err = OutputLock::acquire(temp.path(), "maui").unwrap_err();
        assert_eq!(failure_kind(&err), FailureKind::OutputLocked);

        // Other names are independent.
        let _other = OutputLock::acquire(temp.path(), "other").unwrap();
    }

    #[test]
    fn released_on_drop() {
        let temp = TempDir::new().unwrap();
        let lock = OutputLock::acquire(temp.path(), "maui").unwrap();
        let path = lock.path().to_path_buf();
        drop(lock);
        assert!(!path.exists());
        let _again = OutputLock::acquire(temp.path(), "maui").unwrap();
    }
}
