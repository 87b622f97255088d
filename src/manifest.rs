//! `<outdir>/<name>.manifest.json`: what a successful run produced.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::artifact::iso::ImplantOutcome;
use crate::kernel::KernelVariant;

#[derive(Debug, Clone, Serialize)]
pub struct ManifestKernel {
    pub package: String,
    pub version: String,
    pub index: usize,
    pub default: bool,
    pub dracut: bool,
    pub xen: bool,
}

impl From<&KernelVariant> for ManifestKernel {
    fn from(v: &KernelVariant) -> Self {
        Self {
            package: v.package.clone(),
            version: v.version.clone(),
            index: v.index,
            default: v.is_default,
            dracut: v.is_dracut,
            xen: v.is_xen(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildManifest {
    pub name: String,
    pub label: String,
    pub architecture: String,
    pub started: String,
    pub finished: String,
    pub kernels: Vec<ManifestKernel>,
    pub efi: bool,
    /// `implanted`, `tool-missing` or `failed`.
    pub media_check: &'static str,
    pub artifact: PathBuf,
    pub sha256: Option<String>,
    /// Files and directories of the ISO, relative and sorted.
    pub iso_tree: Vec<String>,
}

impl BuildManifest {
    pub fn path_for(outdir: &Path, name: &str) -> PathBuf {
        outdir.join(format!("{}.manifest.json", name))
    }

    pub fn write(&self, outdir: &Path) -> Result<PathBuf> {
        let path = Self::path_for(outdir, &self.name);
        write_json_atomic(&path, self)
            .with_context(|| format!("writing build manifest '{}'", path.display()))?;
        Ok(path)
    }
}

pub fn media_check_label(outcome: &ImplantOutcome) -> &'static str {
    match outcome {
        ImplantOutcome::Implanted => "implanted",
        ImplantOutcome::ToolMissing => "tool-missing",
        ImplantOutcome::Failed(_) => "failed",
    }
}

/// Sorted, `/`-separated paths under `root`, excluding `root` itself.
pub fn tree_listing(root: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    for ent in WalkDir::new(root).follow_links(false).min_depth(1) {
        let ent = ent.with_context(|| format!("walking {}", root.display()))?;
        let rel = ent
            .path()
            .strip_prefix(root)
            .unwrap_or(ent.path())
            .to_string_lossy()
            .replace('\\', "/");
        entries.push(rel);
    }
    entries.sort();
    Ok(entries)
}

pub fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).context("serializing build manifest")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tree_listing_is_sorted_and_relative() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("isolinux")).unwrap();
        fs::create_dir_all(temp.path().join("LiveOS")).unwrap();
        fs::write(temp.path().join("isolinux/vmlinuz0"), "").unwrap();
        fs::write(temp.path().join("LiveOS/squashfs.img"), "").unwrap();

        assert_eq!(
            tree_listing(temp.path()).unwrap(),
            vec![
                "LiveOS",
                "LiveOS/squashfs.img",
                "isolinux",
                "isolinux/vmlinuz0"
            ]
        );
    }

    #[test]
    fn compact_timestamp_shape() {
        let ts = now_utc_compact();
        assert_eq!(ts.len(), 16);
        assert_eq!(&ts[8..9], "T");
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn writes_json() {
        let temp = TempDir::new().unwrap();
        let manifest = BuildManifest {
            name: "maui".to_string(),
            label: "MAUI_LIVE".to_string(),
            architecture: "x86".to_string(),
            started: "20260101T000000Z".to_string(),
            finished: "20260101T000100Z".to_string(),
            kernels: vec![],
            efi: false,
            media_check: media_check_label(&ImplantOutcome::ToolMissing),
            artifact: temp.path().join("maui.iso"),
            sha256: None,
            iso_tree: vec!["isolinux".to_string()],
        };
        let path = manifest.write(temp.path()).unwrap();
        assert_eq!(path, temp.path().join("maui.manifest.json"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["media_check"], "tool-missing");
        assert_eq!(value["iso_tree"][0], "isolinux");
    }
}
