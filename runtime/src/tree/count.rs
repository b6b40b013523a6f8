//! Pass 1: per-directory child counts.

use docker_spk_core::error::Result;
use std::collections::HashMap;

use super::classify::classify_entry;
use super::merge::{Admission, MergePolicy};
use super::path::TreePath;
use super::source::LayerSource;

/// Number of direct children every directory of the merged tree will hold.
///
/// Directories with no children, including ones only implied by nested
/// paths, are present with a count of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCounts {
    counts: HashMap<TreePath, usize>,
}

impl Default for ChildCounts {
    fn default() -> Self {
        let mut counts = HashMap::new();
        counts.insert(TreePath::root(), 0);
        Self { counts }
    }
}

impl ChildCounts {
    /// Child count of `dir`, zero for unknown paths.
    pub fn get(&self, dir: &TreePath) -> usize {
        self.counts.get(dir).copied().unwrap_or(0)
    }

    pub fn contains(&self, dir: &TreePath) -> bool {
        self.counts.contains_key(dir)
    }

    /// Number of directories tracked, root included.
    pub(crate) fn len(&self) -> usize {
        self.counts.len()
    }

    fn record_directory(&mut self, dir: &TreePath) {
        self.counts.entry(dir.clone()).or_insert(0);
    }

    fn record_child(&mut self, path: &TreePath) {
        *self.counts.entry(path.parent()).or_insert(0) += 1;
    }

    /// Consume the counts as a countdown map.
    pub(crate) fn into_inner(self) -> HashMap<TreePath, usize> {
        self.counts
    }
}

/// Replay `source` once and tally the children of every directory.
///
/// Read failures from the source are returned unchanged; nothing partial
/// survives them.
pub fn count_children<S: LayerSource + ?Sized>(source: &mut S) -> Result<ChildCounts> {
    let mut counts = ChildCounts::default();
    let mut policy = MergePolicy::new();
    let mut accepted = 0usize;

    source.visit_entries(&mut |entry| {
        let class = classify_entry(&entry);
        if !class.is_supported() {
            tracing::trace!(path = %entry.path, "Skipping unsupported entry type");
            return Ok(());
        }

        if let Admission::Accept { implied } = policy.admit(&entry.path, class) {
            for dir in &implied {
                counts.record_directory(dir);
                counts.record_child(dir);
            }
            if class.is_directory() {
                counts.record_directory(&entry.path);
            }
            counts.record_child(&entry.path);
            accepted += 1;
        }
        Ok(())
    })?;

    tracing::info!(
        directories = counts.len(),
        entries = accepted,
        "Counted directory children"
    );
    Ok(counts)
}
