//! End-to-end runs against a fake root and fake external tools.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use livecd_creator::{
    failure_kind, DirectoryRoot, FailureKind, LiveConfig, LivePipeline, RunState, Tool, Toolbox,
};
use tempfile::TempDir;

/// Writes "iso" to the `-o` target and keeps a copy of the staged tree
/// next to it as `captured/`, since the staging tree is gone after the run.
const FAKE_GENISOIMAGE: &str = r#"#!/bin/sh
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
  last="$a"
done
rm -rf "$(dirname "$out")/captured"
cp -r "$last" "$(dirname "$out")/captured" || exit 1
echo iso > "$out"
"#;

const FAKE_MKSQUASHFS: &str = "#!/bin/sh\necho squashfs > \"$2\"\n";

struct Fixture {
    temp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Fixture {
            temp: TempDir::new().unwrap(),
        };
        for rel in [
            "root/boot/vmlinuz-5.10.0-x",
            "root/boot/initramfs-5.10.0-x.img",
            "root/usr/share/syslinux/isolinux.bin",
            "root/usr/share/syslinux/vesamenu.c32",
            "root/usr/bin/checkisomd5",
        ] {
            fixture.touch(rel);
        }
        fs::write(fixture.image(), "ext4 image").unwrap();
        fixture
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn touch(&self, rel: &str) {
        self.write(rel, rel);
    }

    fn write(&self, rel: &str, content: &str) {
        let p = self.path().join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, content).unwrap();
    }

    /// shim, GRUB and font for `suffix` (`x64`, `aa64`) in a vendor tree.
    fn add_efi(&self, suffix: &str) {
        self.touch(&format!("root/boot/efi/EFI/maui/shim{}.efi", suffix));
        self.touch(&format!("root/boot/efi/EFI/maui/grub{}.efi", suffix));
        self.touch("root/boot/efi/EFI/maui/fonts/unicode.pf2");
    }

    /// Copy of the staged ISO tree taken by the fake genisoimage.
    fn captured(&self) -> PathBuf {
        self.outdir().join("captured")
    }

    fn captured_file(&self, rel: &str) -> String {
        fs::read_to_string(self.captured().join(rel)).unwrap()
    }

    fn root(&self) -> PathBuf {
        self.path().join("root")
    }

    fn image(&self) -> PathBuf {
        self.path().join("root.img")
    }

    fn outdir(&self) -> PathBuf {
        self.path().join("out")
    }

    fn tmpdir(&self) -> PathBuf {
        self.path().join("tmp")
    }

    fn tool(&self, name: &str, body: &str) -> PathBuf {
        let dir = self.path().join("bin");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn toolbox(&self) -> Toolbox {
        Toolbox::empty()
            .with_tool(Tool::Genisoimage, self.tool("genisoimage", FAKE_GENISOIMAGE))
            .with_tool(Tool::Mksquashfs, self.tool("mksquashfs", FAKE_MKSQUASHFS))
            .with_tool(Tool::Isohybrid, "/bin/true")
            .with_tool(Tool::Implantisomd5, "/bin/true")
    }

    fn config(&self, extra: &str) -> LiveConfig {
        let text = format!(
            "name = \"maui\"\nfslabel = \"MAUI_LIVE\"\narchitecture = \"x86_64\"\n\
             skip_minimize = true\noutdir = \"{}\"\ntmpdir = \"{}\"\n{}\n\
             [initramfs]\nregenerate = false\n",
            self.outdir().display(),
            self.tmpdir().display(),
            extra
        );
        LiveConfig::from_toml_str(&text).unwrap()
    }

    fn provider(&self) -> DirectoryRoot {
        DirectoryRoot::new(self.root(), self.image())
    }

    /// Staging directories left in the temp parent.
    fn leftover_staging(&self) -> Vec<String> {
        match fs::read_dir(self.tmpdir()) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.starts_with("iso-"))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[test]
fn single_kernel_run_reaches_done() {
    let fx = Fixture::new();
    let mut pipeline = LivePipeline::new(fx.config(""), fx.toolbox()).unwrap();
    let output = pipeline.run(&mut fx.provider()).unwrap();

    assert_eq!(pipeline.state(), Some(RunState::Done));
    assert_eq!(
        pipeline.history(),
        &[
            RunState::Resolving,
            RunState::Rendering,
            RunState::Staging,
            RunState::Compressing,
            RunState::Assembling,
            RunState::Done
        ]
    );

    let iso = fx.outdir().join("maui.iso");
    assert_eq!(output.artifact, iso);
    assert!(iso.is_file());
    assert!(!fx.outdir().join("maui.iso.tmp").exists());
    assert!(fx.leftover_staging().is_empty());
    assert!(!fx.image().exists(), "root image is consumed into LiveOS/");
    assert!(!output.efi_enabled);

    let cfg = fx.captured_file("isolinux/isolinux.cfg");
    // linux0, liveinst0, autoinst0, basicvideo0, check0
    assert_eq!(cfg.matches("  kernel vmlinuz0\n").count(), 5);
    assert_eq!(cfg.matches("menu default").count(), 1);
    assert!(cfg.contains(
        "append initrd=initrd0.img root=live:LABEL=MAUI_LIVE rootfstype=auto ro liveimg\n"
    ));
    assert_eq!(cfg.matches("rd.live.check").count(), 1);

    let sidecar = output.checksum.unwrap();
    assert_eq!(sidecar, fx.outdir().join("maui.iso.sha256"));
    assert!(fs::read_to_string(sidecar).unwrap().ends_with("  maui.iso\n"));

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output.manifest).unwrap()).unwrap();
    assert_eq!(manifest["kernels"][0]["version"], "5.10.0-x");
    assert_eq!(manifest["kernels"][0]["default"], true);
    assert_eq!(manifest["media_check"], "implanted");
    let tree: Vec<&str> = manifest["iso_tree"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(tree.contains(&"LiveOS/squashfs.img"));
    assert!(tree.contains(&"isolinux/initrd0.img"));
    assert!(!fx.outdir().join(".maui.lock").exists());
}

#[test]
fn zero_kernels_fail_before_staging() {
    let fx = Fixture::new();
    fs::remove_file(fx.root().join("boot/vmlinuz-5.10.0-x")).unwrap();

    let mut pipeline = LivePipeline::new(fx.config(""), fx.toolbox()).unwrap();
    let err = pipeline.run(&mut fx.provider()).unwrap_err();

    assert_eq!(failure_kind(&err), FailureKind::NoKernelFound);
    assert_eq!(
        pipeline.state(),
        Some(RunState::Failed(FailureKind::NoKernelFound))
    );
    assert!(!fx.tmpdir().exists(), "no staging directory was created");
    assert!(fx.image().exists());
}

#[test]
fn failing_isohybrid_leaves_no_iso() {
    let fx = Fixture::new();
    let toolbox = fx.toolbox().with_tool(Tool::Isohybrid, "/bin/false");

    let mut pipeline = LivePipeline::new(fx.config(""), toolbox).unwrap();
    let err = pipeline.run(&mut fx.provider()).unwrap_err();

    assert_eq!(failure_kind(&err), FailureKind::HybridPostprocessFailed);
    assert_eq!(
        pipeline.state(),
        Some(RunState::Failed(FailureKind::HybridPostprocessFailed))
    );
    assert!(fx.leftover_staging().is_empty());
    assert!(!fx.outdir().join("maui.iso").exists());
    assert!(!fx.outdir().join("maui.iso.tmp").exists());
}

#[test]
fn missing_optional_tools_still_produce_an_iso() {
    let fx = Fixture::new();
    let toolbox = fx
        .toolbox()
        .without(Tool::Isohybrid)
        .without(Tool::Implantisomd5);

    let mut pipeline = LivePipeline::new(fx.config(""), toolbox).unwrap();
    let output = pipeline.run(&mut fx.provider()).unwrap();

    assert!(output.artifact.is_file());
    // Without implantisomd5 on the host there is no media check entry.
    let cfg = fx.captured_file("isolinux/isolinux.cfg");
    assert!(!cfg.contains("rd.live.check"));
}

#[test]
fn pack_to_replaces_the_iso() {
    let fx = Fixture::new();
    let mut pipeline =
        LivePipeline::new(fx.config("pack_to = \"maui.tar.zst\""), fx.toolbox()).unwrap();
    let output = pipeline.run(&mut fx.provider()).unwrap();

    assert_eq!(output.artifact, fx.outdir().join("maui.tar.zst"));
    assert!(output.artifact.is_file());
    assert!(!fx.outdir().join("maui.iso").exists());
    assert!(fx.outdir().join("maui.tar.zst.sha256").is_file());
}

#[test]
fn missing_syslinux_is_fatal() {
    let fx = Fixture::new();
    fs::remove_dir_all(fx.root().join("usr/share/syslinux")).unwrap();

    let mut pipeline = LivePipeline::new(fx.config(""), fx.toolbox()).unwrap();
    let err = pipeline.run(&mut fx.provider()).unwrap_err();

    assert_eq!(failure_kind(&err), FailureKind::MissingBootloaderAssets);
    assert!(fx.leftover_staging().is_empty());
}

#[test]
fn skip_compression_ships_the_raw_image() {
    let fx = Fixture::new();
    let mut pipeline =
        LivePipeline::new(fx.config("skip_compression = true"), fx.toolbox()).unwrap();
    pipeline.run(&mut fx.provider()).unwrap();

    assert_eq!(fx.captured_file("LiveOS/ext3fs.img"), "ext4 image");
    assert!(!fx.captured().join("LiveOS/squashfs.img").exists());
    assert!(!fx.image().exists());
}

#[test]
fn efi_assets_add_a_grub_tree() {
    let fx = Fixture::new();
    fx.add_efi("x64");
    let mut pipeline = LivePipeline::new(fx.config(""), fx.toolbox()).unwrap();
    let output = pipeline.run(&mut fx.provider()).unwrap();

    assert!(output.efi_enabled);
    let efi = fx.captured().join("EFI/BOOT");
    for f in ["BOOTX64.EFI", "grubx64.efi", "fonts/unicode.pf2", "grub.cfg"] {
        assert!(efi.join(f).is_file(), "{} missing", f);
    }
    assert_eq!(
        fx.captured_file("EFI/BOOT/BOOTX64.EFI"),
        "root/boot/efi/EFI/maui/shimx64.efi"
    );
    let grub = fx.captured_file("EFI/BOOT/grub.cfg");
    assert!(grub.contains("search --no-floppy --set=root -l 'MAUI_LIVE'\n"));
    assert!(grub.contains("\tlinuxefi /isolinux/vmlinuz0 "));
    assert!(grub.contains("\tinitrdefi /isolinux/initrd0.img\n"));

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output.manifest).unwrap()).unwrap();
    assert_eq!(manifest["efi"], true);
}

#[test]
fn xen_default_among_several_kernels() {
    let fx = Fixture::new();
    fx.add_efi("x64");
    for rel in [
        "root/boot/vmlinuz-2.6.18-128.el5xen",
        "root/boot/initrd-2.6.18-128.el5xen.img",
        "root/boot/xen.gz-2.6.18-128.el5",
        "root/usr/share/syslinux/mboot.c32",
    ] {
        fx.touch(rel);
    }
    fx.write(
        "root/usr/lib/modules/2.6.18-128.el5xen/pkgbase",
        "kernel-xen\n",
    );

    let mut pipeline =
        LivePipeline::new(fx.config("default_kernel = \"xen\""), fx.toolbox()).unwrap();
    let output = pipeline.run(&mut fx.provider()).unwrap();

    // "kernel" sorts before "kernel-xen": the plain kernel is index 0.
    assert_eq!(output.variants.len(), 2);
    assert!(!output.variants[0].is_default);
    assert!(output.variants[1].is_default);
    assert!(output.variants[1].is_xen());

    let isolinux = fx.captured().join("isolinux");
    for f in ["mboot.c32", "xen1.gz", "vmlinuz0", "vmlinuz1", "initrd1.img"] {
        assert!(isolinux.join(f).is_file(), "{} missing", f);
    }

    let cfg = fx.captured_file("isolinux/isolinux.cfg");
    assert_eq!(cfg.matches("menu default").count(), 1);
    let at = cfg.find("  menu default\n").unwrap();
    let stanza = &cfg[cfg[..at].rfind("label ").unwrap()..at];
    assert!(stanza.starts_with("label linux1\n"));
    assert!(stanza.contains("  kernel mboot.c32\n"));
    assert!(stanza.contains("  append xen1.gz --- vmlinuz1 "));

    // EFI cannot boot xen and falls back to the plain kernel.
    assert!(output.efi_enabled);
    let grub = fx.captured_file("EFI/BOOT/grub.cfg");
    assert!(grub.contains("/isolinux/vmlinuz0 "));
    assert!(!grub.contains("vmlinuz1"));
}

#[test]
fn arm_run_boots_from_efi_only() {
    let fx = Fixture::new();
    fx.add_efi("aa64");
    let mut config = fx.config("");
    config.architecture = "aarch64".to_string();

    let mut pipeline = LivePipeline::new(config, fx.toolbox()).unwrap();
    let output = pipeline.run(&mut fx.provider()).unwrap();

    assert_eq!(pipeline.state(), Some(RunState::Done));
    assert!(output.efi_enabled);
    assert!(!fx.captured().join("isolinux").exists());

    let efi = fx.captured().join("EFI/BOOT");
    for f in [
        "BOOTAA64.EFI",
        "grubaa64.efi",
        "fonts/unicode.pf2",
        "grub.cfg",
        "vmlinuz0",
        "initrd0.img",
    ] {
        assert!(efi.join(f).is_file(), "{} missing", f);
    }
    let grub = fx.captured_file("EFI/BOOT/grub.cfg");
    assert!(grub.contains("\tlinux /EFI/BOOT/vmlinuz0 "));
    assert!(grub.contains("\tinitrd /EFI/BOOT/initrd0.img\n"));
    assert!(fx.captured().join("LiveOS/squashfs.img").is_file());
}

#[test]
fn arm_without_efi_assets_is_fatal() {
    let fx = Fixture::new();
    let mut config = fx.config("");
    config.architecture = "aarch64".to_string();

    let mut pipeline = LivePipeline::new(config, fx.toolbox()).unwrap();
    let err = pipeline.run(&mut fx.provider()).unwrap_err();

    assert_eq!(failure_kind(&err), FailureKind::MissingBootloaderAssets);
    assert!(fx.leftover_staging().is_empty());
    assert!(fx.image().exists());
}
