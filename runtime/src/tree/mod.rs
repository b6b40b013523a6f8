//! Merged file tree construction.
//!
//! The spk archive stores each directory as a list whose length is fixed
//! when it is allocated, so the tree is built in two passes over the same
//! layer stream:
//!
//! ```text
//! layers ──► count_children ──► ChildCounts ──┐
//!   │                                         ▼
//!   └────────(replayed)──────────────► build_tree ──► BuiltTree ──► sink
//! ```
//!
//! Both passes classify entries the same way and share the first-writer-wins
//! [`MergePolicy`], so every directory ends up exactly as full as it was sized.

mod builder;
mod classify;
mod count;
mod merge;
mod node;
mod path;
mod source;

pub use builder::build_tree;
pub use classify::{classify, classify_entry, Classification};
pub use count::{count_children, ChildCounts};
pub use merge::{Admission, MergePolicy};
pub use node::{find_in, BuiltTree, Node, NodeKind, TreeStats};
pub use path::{TreePath, ROOT};
pub use source::{EntryFlag, LayerEntry, LayerSource, MemoryEntry, MemoryLayers};

use docker_spk_core::error::Result;

/// Top-level entry a Sandstorm package needs to be runnable.
pub const MANIFEST_NAME: &str = "sandstorm-manifest";

/// Run both passes over `source`.
pub fn merge_layers<S: LayerSource + ?Sized>(source: &mut S) -> Result<BuiltTree> {
    let counts = count_children(source)?;
    build_tree(source, counts)
}
