//! Cross-layer merge policy shared by both passes.
//!
//! The accountant sizes every directory before the builder fills it, so
//! both passes must accept exactly the same entries. Each pass drives its
//! own fresh [`MergePolicy`] with the same classified stream; the policy
//! is the only place that decides whether an entry enters the tree.

use std::collections::HashMap;

use super::classify::Classification;
use super::path::TreePath;

/// Outcome of offering one entry to the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The path is new. `implied` lists the ancestor directories, outermost
    /// first, that exist only because of this entry.
    Accept { implied: Vec<TreePath> },
    /// The path already exists; the first writer keeps it.
    Duplicate,
    /// An ancestor already exists as something other than a directory.
    Shadowed { by: TreePath },
}

/// First-writer-wins bookkeeping over every path seen so far.
#[derive(Debug)]
pub struct MergePolicy {
    /// Path -> whether it is a directory. The root is always present.
    seen: HashMap<TreePath, bool>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl MergePolicy {
    pub fn new() -> Self {
        let mut seen = HashMap::new();
        seen.insert(TreePath::root(), true);
        Self { seen }
    }

    /// Decide whether an entry of class `class` at `path` enters the tree,
    /// and record it when it does.
    ///
    /// Unsupported entries must be filtered out before calling this.
    pub fn admit(&mut self, path: &TreePath, class: Classification) -> Admission {
        debug_assert!(class.is_supported());

        if self.seen.contains_key(path) {
            return Admission::Duplicate;
        }

        let mut implied = Vec::new();
        for ancestor in path.ancestors() {
            match self.seen.get(&ancestor) {
                Some(true) => break,
                Some(false) => return Admission::Shadowed { by: ancestor },
                None => implied.push(ancestor),
            }
        }
        implied.reverse();

        for dir in &implied {
            self.seen.insert(dir.clone(), true);
        }
        self.seen.insert(path.clone(), class.is_directory());

        Admission::Accept { implied }
    }

    /// Whether `path` is part of the tree so far.
    pub fn contains(&self, path: &TreePath) -> bool {
        self.seen.contains_key(path)
    }
}
