//! Layer blob decoding.
//!
//! Walks one layer tarball (plain or gzip-compressed) and hands each member
//! to the entry visitor.

use docker_spk_core::error::{Result, SpkError};
use flate2::read::GzDecoder;
use std::io::{BufRead, BufReader, Read};
use tar::Archive;

use crate::tree::{EntryFlag, LayerEntry, TreePath};

/// Leading bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Visit every member of a layer blob.
///
/// # Arguments
///
/// * `blob` - Reader positioned at the start of the layer, limited to its size
/// * `layer` - Index of the layer in replay order
/// * `name` - Layer name inside the image, for error messages
/// * `visitor` - Receives each entry
pub fn visit_layer<R: Read>(
    blob: R,
    layer: usize,
    name: &str,
    visitor: &mut dyn FnMut(LayerEntry<'_>) -> Result<()>,
) -> Result<()> {
    let mut blob = BufReader::new(blob);
    let head = blob.fill_buf().map_err(|e| {
        SpkError::ImageError(format!("Failed to read layer {}: {}", name, e))
    })?;

    if head.starts_with(&GZIP_MAGIC) {
        tracing::debug!(layer = name, "Layer is gzip-compressed");
        visit_tar(GzDecoder::new(blob), layer, name, visitor)
    } else {
        visit_tar(blob, layer, name, visitor)
    }
}

fn visit_tar<R: Read>(
    reader: R,
    layer: usize,
    name: &str,
    visitor: &mut dyn FnMut(LayerEntry<'_>) -> Result<()>,
) -> Result<()> {
    let layer_err =
        |e: std::io::Error| SpkError::ImageError(format!("Malformed layer {}: {}", name, e));

    let mut archive = Archive::new(reader);
    let mut count = 0usize;
    for entry in archive.entries().map_err(layer_err)? {
        let mut entry = entry.map_err(layer_err)?;

        let header = entry.header();
        let flag = EntryFlag::from(header.entry_type());
        let mode = header.mode().map_err(layer_err)?;
        let mtime = header.mtime().map_err(layer_err)?;
        let path = TreePath::new(&entry.path().map_err(layer_err)?.to_string_lossy());
        // A symlink header with no link name points at the empty path.
        let link_target = match flag {
            EntryFlag::Symlink => Some(
                entry
                    .link_name()
                    .map_err(layer_err)?
                    .map(|target| target.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
            _ => None,
        };

        visitor(LayerEntry {
            layer,
            path,
            flag,
            mode,
            mtime,
            link_target,
            content: &mut entry,
        })?;
        count += 1;
    }

    tracing::debug!(layer = name, entries = count, "Walked layer");
    Ok(())
}
