use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use livecd_creator::preflight::check_host_tools;
use livecd_creator::{
    DirectoryRoot, LiveConfig, LivePipeline, LoopImageRoot, RootProvider, Toolbox,
};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  livecd-creator build <config.toml> <root-dir> <image>\n  livecd-creator build-image <config.toml> <image>\n  livecd-creator render <config.toml> <root-dir>\n  livecd-creator preflight <config.toml> [--loop]"
}

fn main() -> Result<()> {
    init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [build, config, root, image] if build == "build" => {
            let mut provider = DirectoryRoot::new(root, image);
            build_with(Path::new(config), &mut provider)
        }
        [build, config, image] if build == "build-image" => {
            let config_path = Path::new(config);
            let config = load_config(config_path)?;
            let mountpoint = mountpoint_for(&config);
            let mut provider = LoopImageRoot::new(image, mountpoint, Toolbox::discover());
            build_with(config_path, &mut provider)
        }
        [render, config, root] if render == "render" => {
            render_config(Path::new(config), Path::new(root))
        }
        [preflight, config] if preflight == "preflight" => run_preflight(Path::new(config), false),
        [preflight, config, flag] if preflight == "preflight" && flag == "--loop" => {
            run_preflight(Path::new(config), true)
        }
        _ => bail!(usage()),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .without_time()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<LiveConfig> {
    LiveConfig::load(path)
}

fn mountpoint_for(config: &LiveConfig) -> PathBuf {
    config
        .tmpdir
        .clone()
        .unwrap_or_else(std::env::temp_dir)
        .join(format!("{}-root-{}", config.name, std::process::id()))
}

fn build_with(config_path: &Path, provider: &mut dyn RootProvider) -> Result<()> {
    let config = load_config(config_path)?;
    let toolbox = Toolbox::discover();
    check_host_tools(&config, &toolbox, provider.host_tools()).context("preflight failed")?;

    let mut pipeline = LivePipeline::new(config, toolbox)?;
    let output = pipeline
        .run(provider)
        .with_context(|| format!("building live image from '{}'", config_path.display()))?;

    println!("{}", output.artifact.display());
    if let Some(checksum) = &output.checksum {
        println!("{}", checksum.display());
    }
    println!("{}", output.manifest.display());
    Ok(())
}

fn render_config(config_path: &Path, root: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = LivePipeline::new(config, Toolbox::discover())?;
    let rendered = pipeline
        .render(root)
        .with_context(|| format!("rendering boot configuration for '{}'", root.display()))?;

    if let Some(isolinux) = &rendered.isolinux {
        println!("# isolinux/isolinux.cfg\n{}", isolinux);
    }
    match &rendered.grub {
        Some(grub) => println!("# EFI/BOOT/grub.cfg\n{}", grub),
        None => println!("# EFI/BOOT/grub.cfg: EFI disabled"),
    }
    Ok(())
}

fn run_preflight(config_path: &Path, loop_image: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let provider_tools: &[_] = if loop_image {
        LoopImageRoot::HOST_TOOLS
    } else {
        &[]
    };
    check_host_tools(&config, &Toolbox::discover(), provider_tools)?;
    println!("preflight ok");
    Ok(())
}
