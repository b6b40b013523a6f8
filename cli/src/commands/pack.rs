//! `docker-spk pack` command - Convert an image archive into a package.

use clap::Args;
use docker_spk_core::{LayerOrder, PackConfig, DEFAULT_COMPRESSION_LEVEL};
use docker_spk_runtime::tree::MANIFEST_NAME;
use std::path::PathBuf;

use crate::output::format_bytes;

#[derive(Args)]
pub struct PackArgs {
    /// Image archive written by `docker save`
    #[arg(long)]
    pub image: PathBuf,

    /// App id to sign the package with; its key must be in the keyring
    #[arg(long = "app-id")]
    pub app_id: String,

    /// Output file (default: image path with .tar replaced by .spk)
    #[arg(long = "out")]
    pub out: Option<PathBuf>,

    /// Sandstorm keyring (default: ~/.sandstorm-keyring)
    #[arg(long)]
    pub keyring: Option<PathBuf>,

    /// Which layer wins when several define the same path
    #[arg(long = "layer-order", default_value_t = LayerOrder::BottomUp)]
    pub layer_order: LayerOrder,

    /// xz compression preset (0-9)
    #[arg(long = "compression-level", default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    pub compression_level: u32,
}

impl PackArgs {
    pub fn into_config(self) -> PackConfig {
        let mut config = PackConfig::new(self.image, self.app_id);
        config.output = self.out;
        config.keyring = self.keyring;
        config.layer_order = self.layer_order;
        config.compression_level = self.compression_level;
        config
    }
}

pub fn execute(args: PackArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config();
    tracing::debug!(?config, "Packing image");
    let report = docker_spk_runtime::pack_image(&config)?;

    if !report.manifest_present {
        eprintln!(
            "Warning: the image has no top-level {MANIFEST_NAME}; \
             Sandstorm will not be able to run this package."
        );
    }

    let stats = report.stats;
    println!(
        "Packed {} ({} files, {} executables, {} symlinks, {} directories)",
        report.output.display(),
        stats.files,
        stats.executables,
        stats.symlinks,
        stats.directories,
    );
    if !report.image_tags.is_empty() {
        println!("Image:   {}", report.image_tags.join(", "));
    }
    println!("App id:  {}", report.app_id);
    println!("Size:    {}", format_bytes(report.size));
    println!("SHA-256: {}", report.sha256);
    Ok(())
}
