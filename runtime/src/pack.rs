//! Image to package conversion.

use docker_spk_core::config::PackConfig;
use docker_spk_core::error::Result;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::oci::DockerImage;
use crate::spk::{write_package, ArchiveEncoder, Ed25519Signer, KeyStore, Keyring, Signer, TreeSink};
use crate::tree::{merge_layers, TreeStats, MANIFEST_NAME};

/// Outcome of a successful pack.
#[derive(Debug, Clone)]
pub struct PackReport {
    /// Package written
    pub output: PathBuf,
    pub app_id: String,
    /// Whether the image carries a top-level `sandstorm-manifest`
    pub manifest_present: bool,
    pub stats: TreeStats,
    /// Repository tags the image was saved under
    pub image_tags: Vec<String>,
    /// Name of the image config member, if the manifest names one
    pub image_config: Option<String>,
    /// Package size in bytes
    pub size: u64,
    /// Hex SHA-256 of the package file
    pub sha256: String,
}

/// Convert the `docker save` archive named by `config` into a signed spk.
///
/// The key is resolved before the image is read so a wrong app id fails fast.
pub fn pack_image(config: &PackConfig) -> Result<PackReport> {
    config.validate()?;

    let keyring_path = config.keyring_path();
    let keyring = Keyring::load(&keyring_path)?;
    let key = keyring.lookup(&config.app_id)?;
    let signer = Ed25519Signer::new(key)?;
    let app_id = key.app_id()?;

    let mut image = DockerImage::from_path(&config.image)?.with_layer_order(config.layer_order);
    tracing::info!(
        image = %config.image.display(),
        layers = image.layers().len(),
        order = %config.layer_order,
        config = image.config_name().unwrap_or("-"),
        "Opened image"
    );
    let image_tags = image.repo_tags().to_vec();
    let image_config = image.config_name().map(str::to_string);

    let tree = merge_layers(&mut image)?;
    if !tree.manifest_present {
        tracing::warn!(
            "Image has no top-level {}; the package will not be runnable",
            MANIFEST_NAME
        );
    }

    let archive = ArchiveEncoder::new().write_tree(&tree.files)?;
    let signature = signer.sign(&archive)?;
    let package = write_package(Vec::new(), &signature, &archive, config.compression_level)?;

    let output = config.output_path();
    std::fs::write(&output, &package)?;
    let sha256 = hex::encode(Sha256::digest(&package));

    tracing::info!(
        output = %output.display(),
        size = package.len(),
        sha256 = %sha256,
        "Wrote package"
    );

    Ok(PackReport {
        output,
        app_id,
        manifest_present: tree.manifest_present,
        stats: tree.stats(),
        image_tags,
        image_config,
        size: package.len() as u64,
        sha256,
    })
}
