//! The entry stream both passes consume.

use docker_spk_core::error::Result;
use std::io::Read;

use super::path::TreePath;

/// Raw type flag of a layer entry, before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFlag {
    Directory,
    Regular,
    Symlink,
    /// Hard links, devices, fifos and anything else.
    Other,
}

impl From<tar::EntryType> for EntryFlag {
    fn from(entry_type: tar::EntryType) -> Self {
        match entry_type {
            tar::EntryType::Directory => Self::Directory,
            tar::EntryType::Regular => Self::Regular,
            tar::EntryType::Symlink => Self::Symlink,
            _ => Self::Other,
        }
    }
}

/// One record of a layer, valid only for the duration of a visitor call.
pub struct LayerEntry<'a> {
    /// Index of the layer in replay order
    pub layer: usize,
    pub path: TreePath,
    pub flag: EntryFlag,
    /// Permission bits
    pub mode: u32,
    /// Modification time in seconds since the epoch
    pub mtime: u64,
    pub link_target: Option<String>,
    /// File content; empty for anything but regular files
    pub content: &'a mut dyn Read,
}

/// An ordered sequence of layers that can be replayed from the start.
pub trait LayerSource {
    /// Number of layers the source will replay.
    fn layer_count(&self) -> usize;

    /// Rewind and feed every entry of every layer to `visitor`, in order.
    ///
    /// The first error, from the source or from the visitor, stops the
    /// traversal and is returned.
    fn visit_entries(
        &mut self,
        visitor: &mut dyn FnMut(LayerEntry<'_>) -> Result<()>,
    ) -> Result<()>;
}

/// A single in-memory entry for [`MemoryLayers`].
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub path: String,
    pub flag: EntryFlag,
    pub mode: u32,
    pub mtime: u64,
    pub link_target: Option<String>,
    pub content: Vec<u8>,
}

impl MemoryEntry {
    pub fn dir(path: &str) -> Self {
        Self::new(path, EntryFlag::Directory, 0o755)
    }

    pub fn file(path: &str, mode: u32, content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            ..Self::new(path, EntryFlag::Regular, mode)
        }
    }

    pub fn symlink(path: &str, target: &str) -> Self {
        Self {
            link_target: Some(target.to_string()),
            ..Self::new(path, EntryFlag::Symlink, 0o777)
        }
    }

    pub fn other(path: &str) -> Self {
        Self::new(path, EntryFlag::Other, 0o644)
    }

    /// Set the modification time in seconds.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    fn new(path: &str, flag: EntryFlag, mode: u32) -> Self {
        Self {
            path: path.to_string(),
            flag,
            mode,
            mtime: 0,
            link_target: None,
            content: Vec::new(),
        }
    }
}

/// Layers held in memory, mostly useful for tests and for callers that
/// already decoded their image format.
#[derive(Debug, Clone, Default)]
pub struct MemoryLayers {
    layers: Vec<Vec<MemoryEntry>>,
}

impl MemoryLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer on top of the existing ones.
    pub fn with_layer(mut self, entries: Vec<MemoryEntry>) -> Self {
        self.layers.push(entries);
        self
    }
}

impl LayerSource for MemoryLayers {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn visit_entries(
        &mut self,
        visitor: &mut dyn FnMut(LayerEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        for (layer, entries) in self.layers.iter().enumerate() {
            for entry in entries {
                let mut content = entry.content.as_slice();
                visitor(LayerEntry {
                    layer,
                    path: TreePath::new(&entry.path),
                    flag: entry.flag,
                    mode: entry.mode,
                    mtime: entry.mtime,
                    link_target: entry.link_target.clone(),
                    content: &mut content,
                })?;
            }
        }
        Ok(())
    }
}
