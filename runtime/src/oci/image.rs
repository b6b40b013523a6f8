//! `docker save` archive parsing.
//!
//! Indexes the outer tarball once, works out the layer order from
//! `manifest.json`, and replays the layers on demand.

use docker_spk_core::config::LayerOrder;
use docker_spk_core::error::{Result, SpkError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tar::{Archive, EntryType};

use super::layers::visit_layer;
use crate::tree::{LayerEntry, LayerSource, TreePath};

/// Name of the image manifest inside a `docker save` archive.
const MANIFEST_FILE: &str = "manifest.json";

/// Suffix of layer members in the legacy layout without a manifest.
const LEGACY_LAYER_SUFFIX: &str = "layer.tar";

/// Upper bound on member symlink chains.
const MAX_LINK_DEPTH: usize = 8;

/// One element of `manifest.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestEntry {
    #[serde(default)]
    config: Option<String>,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
    #[serde(default)]
    layers: Vec<String>,
}

/// Where a member of the outer archive lives.
#[derive(Debug, Clone)]
enum Member {
    Data { offset: u64, size: u64 },
    Link(String),
}

/// A layer blob inside the outer archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBlob {
    /// Member name, e.g. `abc123/layer.tar`
    pub name: String,
    /// Byte offset of the blob data in the outer archive
    pub offset: u64,
    pub size: u64,
}

/// A Docker image saved with `docker save`, readable as a [`LayerSource`].
pub struct DockerImage<R> {
    reader: R,
    /// Layers bottom to top
    layers: Vec<LayerBlob>,
    repo_tags: Vec<String>,
    config: Option<String>,
    order: LayerOrder,
}

impl DockerImage<BufReader<File>> {
    /// Open an image archive on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            SpkError::ImageError(format!("Failed to open image {}: {}", path.display(), e))
        })?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> DockerImage<R> {
    /// Index an image archive.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The outer archive is not a readable tarball
    /// - `manifest.json` is malformed or names a layer that is missing
    /// - The image has no layers
    pub fn open(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let (members, member_order, manifest) = index_members(&mut reader)?;

        let (layer_names, repo_tags, config) = match manifest {
            Some(raw) => {
                let mut entries: Vec<ManifestEntry> = serde_json::from_str(&raw).map_err(|e| {
                    SpkError::ImageError(format!("Failed to parse {}: {}", MANIFEST_FILE, e))
                })?;
                if entries.is_empty() {
                    return Err(SpkError::ImageError(format!(
                        "{} lists no images",
                        MANIFEST_FILE
                    )));
                }
                if entries.len() > 1 {
                    tracing::warn!(
                        images = entries.len(),
                        "Archive holds several images, converting the first"
                    );
                }
                let first = entries.swap_remove(0);
                (
                    first.layers,
                    first.repo_tags.unwrap_or_default(),
                    first.config,
                )
            }
            None => {
                tracing::debug!("No manifest.json, falling back to legacy layer discovery");
                let names = member_order
                    .into_iter()
                    .filter(|name| {
                        name.as_str() == LEGACY_LAYER_SUFFIX
                            || name.ends_with(&format!("/{}", LEGACY_LAYER_SUFFIX))
                    })
                    .collect();
                (names, Vec::new(), None)
            }
        };

        let layers = layer_names
            .iter()
            .map(|name| resolve_member(&members, name))
            .collect::<Result<Vec<_>>>()?;
        if layers.is_empty() {
            return Err(SpkError::ImageError("Image contains no layers".to_string()));
        }

        tracing::info!(
            layers = layers.len(),
            tags = ?repo_tags,
            "Indexed image archive"
        );

        Ok(Self {
            reader,
            layers,
            repo_tags,
            config,
            order: LayerOrder::default(),
        })
    }

    /// Set the order in which layers are replayed.
    pub fn with_layer_order(mut self, order: LayerOrder) -> Self {
        self.order = order;
        self
    }

    /// Layers bottom to top, regardless of replay order.
    pub fn layers(&self) -> &[LayerBlob] {
        &self.layers
    }

    pub fn repo_tags(&self) -> &[String] {
        &self.repo_tags
    }

    /// Name of the image config member, when the manifest gives one.
    pub fn config_name(&self) -> Option<&str> {
        self.config.as_deref()
    }

    fn replay_order(&self) -> Vec<usize> {
        match self.order {
            LayerOrder::BottomUp => (0..self.layers.len()).collect(),
            LayerOrder::TopDown => (0..self.layers.len()).rev().collect(),
        }
    }
}

impl<R: Read + Seek> LayerSource for DockerImage<R> {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn visit_entries(
        &mut self,
        visitor: &mut dyn FnMut(LayerEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        for (position, idx) in self.replay_order().into_iter().enumerate() {
            let blob = self.layers[idx].clone();
            tracing::debug!(
                layer = %blob.name,
                position,
                size = blob.size,
                "Replaying layer"
            );
            self.reader.seek(SeekFrom::Start(blob.offset))?;
            let limited = (&mut self.reader).take(blob.size);
            visit_layer(limited, position, &blob.name, visitor)?;
        }
        Ok(())
    }
}

type MemberIndex = (HashMap<String, Member>, Vec<String>, Option<String>);

/// Record the location of every member and read `manifest.json`.
fn index_members<R: Read>(reader: &mut R) -> Result<MemberIndex> {
    let image_err =
        |e: std::io::Error| SpkError::ImageError(format!("Malformed image archive: {}", e));

    let mut members = HashMap::new();
    let mut order = Vec::new();
    let mut manifest = None;

    let mut archive = Archive::new(reader);
    for entry in archive.entries().map_err(image_err)? {
        let mut entry = entry.map_err(image_err)?;
        let name = TreePath::new(&entry.path().map_err(image_err)?.to_string_lossy()).to_string();

        match entry.header().entry_type() {
            EntryType::Regular => {
                if name == MANIFEST_FILE {
                    let mut raw = String::new();
                    entry.read_to_string(&mut raw).map_err(image_err)?;
                    manifest = Some(raw);
                    continue;
                }
                let member = Member::Data {
                    offset: entry.raw_file_position(),
                    size: entry.size(),
                };
                members.insert(name.clone(), member);
            }
            EntryType::Symlink => {
                let target = match entry.link_name().map_err(image_err)? {
                    Some(target) => target.to_string_lossy().into_owned(),
                    None => continue,
                };
                let base = TreePath::new(&name).parent();
                let resolved = TreePath::new(&format!("{}/{}", base, target)).to_string();
                members.insert(name.clone(), Member::Link(resolved));
            }
            _ => continue,
        }
        order.push(name);
    }

    Ok((members, order, manifest))
}

/// Find the data of `name`, following member symlinks.
fn resolve_member(members: &HashMap<String, Member>, name: &str) -> Result<LayerBlob> {
    let mut current = TreePath::new(name).to_string();
    for _ in 0..MAX_LINK_DEPTH {
        match members.get(&current) {
            Some(Member::Data { offset, size }) => {
                return Ok(LayerBlob {
                    name: name.to_string(),
                    offset: *offset,
                    size: *size,
                })
            }
            Some(Member::Link(target)) => current = target.clone(),
            None => {
                return Err(SpkError::ImageError(format!(
                    "Layer {} is missing from the image archive",
                    name
                )))
            }
        }
    }
    Err(SpkError::ImageError(format!(
        "Layer {} is a symlink chain deeper than {}",
        name, MAX_LINK_DEPTH
    )))
}
