//! Pass 2: fill the preallocated directory slots.
//!
//! Every directory is created with exactly as many slots as the counting
//! pass found children for it. A child takes the slot at
//! `len - remaining[parent]` and decrements the countdown, so slot order is
//! the order in which siblings are discovered. Parents that were never
//! declared are created on demand the first time a descendant needs them.

use docker_spk_core::error::{Result, SpkError};
use std::collections::HashMap;
use std::io::Read;

use super::classify::{classify_entry, Classification};
use super::count::ChildCounts;
use super::merge::{Admission, MergePolicy};
use super::node::{BuiltTree, Node, NodeKind};
use super::path::TreePath;
use super::source::{LayerEntry, LayerSource};
use super::MANIFEST_NAME;

type NodeId = usize;

const ROOT_ID: NodeId = 0;

const NANOS_PER_SEC: i64 = 1_000_000_000;

enum Body {
    /// Allocated into a parent slot but not populated yet.
    Pending,
    Directory(Box<[Option<NodeId>]>),
    Regular(Vec<u8>),
    Executable(Vec<u8>),
    Symlink(String),
}

struct Slot {
    name: String,
    modified_ns: i64,
    body: Body,
}

/// Arena of nodes plus the path index, scoped to one build.
struct TreeBuilder {
    arena: Vec<Slot>,
    /// Path -> node, root included. Entries are never removed.
    index: HashMap<TreePath, NodeId>,
    /// Countdown of free slots per directory.
    remaining: HashMap<TreePath, usize>,
}

impl TreeBuilder {
    fn new(counts: ChildCounts) -> Self {
        let remaining = counts.into_inner();
        let root_len = remaining.get(&TreePath::root()).copied().unwrap_or(0);

        let mut index = HashMap::new();
        index.insert(TreePath::root(), ROOT_ID);

        Self {
            arena: vec![Slot {
                name: String::new(),
                modified_ns: 0,
                body: Body::Directory(vec![None; root_len].into_boxed_slice()),
            }],
            index,
            remaining,
        }
    }

    /// Populate a fresh slot for an accepted entry.
    fn insert(&mut self, entry: LayerEntry<'_>, class: Classification) -> Result<()> {
        let path = entry.path;
        if self.index.contains_key(&path) {
            return Err(SpkError::InternalConsistency(format!(
                "{} admitted twice",
                path
            )));
        }

        let id = self.allocate_child(&path)?;
        let body = match class {
            Classification::Directory => Body::Directory(self.empty_slots(&path)),
            Classification::RegularFile | Classification::ExecutableFile => {
                let mut bytes = Vec::new();
                entry.content.read_to_end(&mut bytes).map_err(|e| {
                    SpkError::IoError(std::io::Error::new(
                        e.kind(),
                        format!("Failed to read {} from layer {}: {}", path, entry.layer, e),
                    ))
                })?;
                if class == Classification::ExecutableFile {
                    Body::Executable(bytes)
                } else {
                    Body::Regular(bytes)
                }
            }
            Classification::SymbolicLink => Body::Symlink(entry.link_target.unwrap_or_default()),
            Classification::Unsupported => {
                return Err(SpkError::InternalConsistency(format!(
                    "unsupported entry {} reached the builder",
                    path
                )))
            }
        };

        let slot = &mut self.arena[id];
        slot.modified_ns = i64::try_from(entry.mtime)
            .unwrap_or(i64::MAX)
            .saturating_mul(NANOS_PER_SEC);
        slot.body = body;
        self.index.insert(path, id);
        Ok(())
    }

    /// Return the directory node for `dir`, creating it (and its own
    /// missing parents) when nothing declared it yet.
    fn directory_for(&mut self, dir: &TreePath) -> Result<NodeId> {
        if let Some(&id) = self.index.get(dir) {
            return match self.arena[id].body {
                Body::Directory(_) => Ok(id),
                _ => Err(SpkError::InternalConsistency(format!(
                    "{} is used as a parent but is not a directory",
                    dir
                ))),
            };
        }

        let id = self.allocate_child(dir)?;
        let slots = self.empty_slots(dir);
        self.arena[id].body = Body::Directory(slots);
        self.index.insert(dir.clone(), id);
        tracing::trace!(path = %dir, "Materialized implied directory");
        Ok(id)
    }

    /// Claim the next free slot of `path`'s parent and name it.
    fn allocate_child(&mut self, path: &TreePath) -> Result<NodeId> {
        let parent = path.parent();
        let parent_id = self.directory_for(&parent)?;

        let len = match &self.arena[parent_id].body {
            Body::Directory(slots) => slots.len(),
            _ => unreachable!("directory_for returned a non-directory"),
        };
        let remaining = self.remaining.get(&parent).copied().unwrap_or(0);
        if remaining == 0 || remaining > len {
            return Err(SpkError::InternalConsistency(format!(
                "slot overflow: {} has {} preallocated slots, no room for {}",
                parent,
                len,
                path.base()
            )));
        }
        let index = len - remaining;
        self.remaining.insert(parent, remaining - 1);

        let id = self.arena.len();
        self.arena.push(Slot {
            name: path.base().to_string(),
            modified_ns: 0,
            body: Body::Pending,
        });
        if let Body::Directory(slots) = &mut self.arena[parent_id].body {
            slots[index] = Some(id);
        }
        Ok(id)
    }

    fn empty_slots(&self, dir: &TreePath) -> Box<[Option<NodeId>]> {
        let len = self.remaining.get(dir).copied().unwrap_or(0);
        vec![None; len].into_boxed_slice()
    }

    fn finish(mut self) -> Result<BuiltTree> {
        if let Some((dir, left)) = self.remaining.iter().find(|(_, left)| **left != 0) {
            return Err(SpkError::InternalConsistency(format!(
                "{} still has {} unfilled slots",
                dir, left
            )));
        }

        let manifest_present = self.index.contains_key(&TreePath::new(MANIFEST_NAME));
        let files = match std::mem::replace(&mut self.arena[ROOT_ID].body, Body::Pending) {
            Body::Directory(slots) => self.assemble_slots(&slots, &TreePath::root())?,
            _ => unreachable!("root is always a directory"),
        };
        Ok(BuiltTree {
            files,
            manifest_present,
        })
    }

    fn assemble_slots(&mut self, slots: &[Option<NodeId>], dir: &TreePath) -> Result<Vec<Node>> {
        let mut children = Vec::with_capacity(slots.len());
        for (i, slot) in slots.iter().enumerate() {
            let id = slot.ok_or_else(|| {
                SpkError::InternalConsistency(format!(
                    "slot {} of {} ({} preallocated) was never filled",
                    i,
                    dir,
                    slots.len()
                ))
            })?;
            let path = dir.join(&self.arena[id].name);
            children.push(self.assemble(id, &path)?);
        }
        Ok(children)
    }

    fn assemble(&mut self, id: NodeId, path: &TreePath) -> Result<Node> {
        let name = std::mem::take(&mut self.arena[id].name);
        let modified_ns = self.arena[id].modified_ns;
        let kind = match std::mem::replace(&mut self.arena[id].body, Body::Pending) {
            Body::Directory(slots) => NodeKind::Directory(self.assemble_slots(&slots, path)?),
            Body::Regular(bytes) => NodeKind::Regular(bytes),
            Body::Executable(bytes) => NodeKind::Executable(bytes),
            Body::Symlink(target) => NodeKind::Symlink(target),
            Body::Pending => {
                return Err(SpkError::InternalConsistency(format!(
                    "{} was allocated but never populated",
                    path
                )))
            }
        };
        Ok(Node {
            name,
            modified_ns,
            kind,
        })
    }
}

/// Replay `source` a second time and build the merged tree, sized by `counts`.
///
/// `counts` must come from [`count_children`](super::count_children) over
/// the same source; any disagreement surfaces as
/// [`SpkError::InternalConsistency`].
pub fn build_tree<S: LayerSource + ?Sized>(
    source: &mut S,
    counts: ChildCounts,
) -> Result<BuiltTree> {
    let mut builder = TreeBuilder::new(counts);
    let mut policy = MergePolicy::new();

    source.visit_entries(&mut |entry| {
        let class = classify_entry(&entry);
        if !class.is_supported() {
            tracing::debug!(
                layer = entry.layer,
                path = %entry.path,
                "Dropping entry of unsupported type"
            );
            return Ok(());
        }

        match policy.admit(&entry.path, class) {
            Admission::Accept { .. } => builder.insert(entry, class),
            Admission::Duplicate => {
                tracing::debug!(
                    layer = entry.layer,
                    path = %entry.path,
                    "Path already defined by an earlier entry, keeping the first"
                );
                Ok(())
            }
            Admission::Shadowed { by } => {
                tracing::warn!(
                    layer = entry.layer,
                    path = %entry.path,
                    shadowed_by = %by,
                    "Dropping entry below a path that is not a directory"
                );
                Ok(())
            }
        }
    })?;

    let tree = builder.finish()?;
    let stats = tree.stats();
    tracing::info!(
        directories = stats.directories,
        files = stats.files + stats.executables,
        symlinks = stats.symlinks,
        bytes = stats.bytes,
        "Built merged tree"
    );
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::count::count_children;
    use crate::tree::source::{EntryFlag, MemoryEntry, MemoryLayers};

    fn convert(source: &mut MemoryLayers) -> Result<BuiltTree> {
        let counts = count_children(source)?;
        build_tree(source, counts)
    }

    fn names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Every directory holds exactly as many children as were counted.
    fn assert_matches_counts(nodes: &[Node], dir: &TreePath, counts: &ChildCounts) {
        assert_eq!(nodes.len(), counts.get(dir), "children of {}", dir);
        for node in nodes {
            if let NodeKind::Directory(children) = &node.kind {
                assert_matches_counts(children, &dir.join(&node.name), counts);
            }
        }
    }

    #[test]
    fn test_slots_follow_discovery_order() {
        let mut source = MemoryLayers::new().with_layer(vec![
            MemoryEntry::file("zeta", 0o644, b"z"),
            MemoryEntry::dir("alpha"),
            MemoryEntry::symlink("mid", "alpha"),
        ]);
        let tree = convert(&mut source).unwrap();
        assert_eq!(names(&tree.files), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_count_and_build_agree() {
        let mut source = MemoryLayers::new()
            .with_layer(vec![
                MemoryEntry::dir("usr"),
                MemoryEntry::file("usr/lib/os-release", 0o644, b"ID=test"),
                MemoryEntry::dir("usr/bin"),
                MemoryEntry::file("usr/bin/env", 0o755, b"\x7fELF"),
                MemoryEntry::other("dev/console"),
                MemoryEntry::dir("./"),
            ])
            .with_layer(vec![
                MemoryEntry::file("usr/bin/env", 0o755, b"newer"),
                MemoryEntry::dir("usr/lib"),
                MemoryEntry::file("opt/app/deep/er/main.js", 0o644, b"js"),
                MemoryEntry::symlink("lib", "usr/lib"),
                MemoryEntry::file("lib/ld.so", 0o755, b"shadowed"),
                MemoryEntry::dir("tmp"),
            ]);
        let counts = count_children(&mut source).unwrap();
        let tree = build_tree(&mut source, counts.clone()).unwrap();
        assert_matches_counts(&tree.files, &TreePath::root(), &counts);
        assert_eq!(names(&tree.files), vec!["usr", "opt", "lib", "tmp"]);
        assert!(tree.find("lib/ld.so").is_none());
        assert!(tree.find("dev").is_none());
    }

    #[test]
    fn test_first_writer_wins_across_layers() {
        let mut source = MemoryLayers::new()
            .with_layer(vec![MemoryEntry::file("a/b", 0o644, b"layer one")])
            .with_layer(vec![
                MemoryEntry::dir("a/b"),
                MemoryEntry::file("a/b/c", 0o644, b"layer two"),
            ]);
        let tree = convert(&mut source).unwrap();
        let b = tree.find("a/b").unwrap();
        assert_eq!(b.kind, NodeKind::Regular(b"layer one".to_vec()));
        assert_eq!(tree.find("a").unwrap().children().len(), 1);
    }

    #[test]
    fn test_first_writer_wins_within_layer() {
        let mut source = MemoryLayers::new().with_layer(vec![
            MemoryEntry::symlink("x", "one"),
            MemoryEntry::symlink("x", "two"),
        ]);
        let tree = convert(&mut source).unwrap();
        assert_eq!(tree.files.len(), 1);
        assert_eq!(tree.files[0].kind, NodeKind::Symlink("one".to_string()));
    }

    #[test]
    fn test_implicit_directories_materialized() {
        let mut source =
            MemoryLayers::new().with_layer(vec![MemoryEntry::file("x/y/z.txt", 0o644, b"zzz")]);
        let tree = convert(&mut source).unwrap();

        let x = tree.find("x").unwrap();
        assert!(x.is_directory());
        assert_eq!(names(x.children()), vec!["y"]);
        assert_eq!(x.modified_ns, 0);

        let y = tree.find("x/y").unwrap();
        assert!(y.is_directory());
        assert_eq!(names(y.children()), vec!["z.txt"]);
        assert_eq!(
            tree.find("x/y/z.txt").unwrap().kind,
            NodeKind::Regular(b"zzz".to_vec())
        );
    }

    #[test]
    fn test_late_explicit_directory_keeps_implied_node() {
        let mut source = MemoryLayers::new().with_layer(vec![
            MemoryEntry::file("etc/ssl/cert.pem", 0o644, b"pem"),
            MemoryEntry::dir("etc").with_mtime(10),
            MemoryEntry::file("etc/hosts", 0o644, b"hosts"),
        ]);
        let tree = convert(&mut source).unwrap();
        let etc = tree.find("etc").unwrap();
        assert_eq!(names(etc.children()), vec!["ssl", "hosts"]);
        assert_eq!(etc.modified_ns, 0);
    }

    #[test]
    fn test_classification_in_tree() {
        let mut source = MemoryLayers::new().with_layer(vec![
            MemoryEntry::file("plain", 0o644, b"p"),
            MemoryEntry::file("tool", 0o755, b"t"),
            MemoryEntry::symlink("link", "../foo"),
            MemoryEntry::dir("empty"),
        ]);
        let tree = convert(&mut source).unwrap();
        assert_eq!(tree.find("plain").unwrap().kind, NodeKind::Regular(b"p".to_vec()));
        assert_eq!(tree.find("tool").unwrap().kind, NodeKind::Executable(b"t".to_vec()));
        assert_eq!(
            tree.find("link").unwrap().kind,
            NodeKind::Symlink("../foo".to_string())
        );
        assert_eq!(tree.find("empty").unwrap().kind, NodeKind::Directory(vec![]));
    }

    #[test]
    fn test_unsupported_entries_take_no_slot() {
        let mut source = MemoryLayers::new().with_layer(vec![
            MemoryEntry::dir("dev"),
            MemoryEntry::other("dev/null"),
            MemoryEntry::file("dev/README", 0o644, b"r"),
            MemoryEntry::other("hardlink"),
        ]);
        let tree = convert(&mut source).unwrap();
        assert_eq!(names(&tree.files), vec!["dev"]);
        assert_eq!(names(tree.find("dev").unwrap().children()), vec!["README"]);
    }

    #[test]
    fn test_manifest_presence() {
        let base = vec![
            MemoryEntry::dir("opt"),
            MemoryEntry::file("opt/app", 0o755, b"app"),
        ];
        let mut without = MemoryLayers::new().with_layer(base.clone());
        let tree = convert(&mut without).unwrap();
        assert!(!tree.manifest_present);

        let mut with = MemoryLayers::new()
            .with_layer(base)
            .with_layer(vec![MemoryEntry::file("sandstorm-manifest", 0o644, b"m")]);
        let tree_with = convert(&mut with).unwrap();
        assert!(tree_with.manifest_present);
        assert_eq!(tree_with.files[..1], tree.files[..]);
    }

    #[test]
    fn test_nested_manifest_does_not_count() {
        let mut source = MemoryLayers::new()
            .with_layer(vec![MemoryEntry::file("opt/sandstorm-manifest", 0o644, b"m")]);
        assert!(!convert(&mut source).unwrap().manifest_present);
    }

    #[test]
    fn test_rerun_is_identical() {
        let mut source = MemoryLayers::new()
            .with_layer(vec![
                MemoryEntry::file("b/2", 0o644, b"two").with_mtime(5),
                MemoryEntry::file("a/1", 0o755, b"one"),
            ])
            .with_layer(vec![MemoryEntry::symlink("b/3", "2")]);
        let first = convert(&mut source).unwrap();
        let second = convert(&mut source).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.find("b/2").unwrap().modified_ns, 5 * NANOS_PER_SEC);
    }

    #[test]
    fn test_empty_source_gives_empty_tree() {
        let tree = convert(&mut MemoryLayers::new()).unwrap();
        assert!(tree.files.is_empty());
        assert!(!tree.manifest_present);
    }

    #[test]
    fn test_mismatched_counts_are_internal_errors() {
        let mut small = MemoryLayers::new().with_layer(vec![MemoryEntry::dir("a")]);
        let mut large = MemoryLayers::new().with_layer(vec![
            MemoryEntry::dir("a"),
            MemoryEntry::dir("b"),
        ]);
        let counts = count_children(&mut small).unwrap();
        let err = build_tree(&mut large, counts).unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().contains("slot overflow"));
    }

    #[test]
    fn test_unfilled_slots_are_internal_errors() {
        let mut large = MemoryLayers::new().with_layer(vec![
            MemoryEntry::dir("a"),
            MemoryEntry::dir("b"),
        ]);
        let mut small = MemoryLayers::new().with_layer(vec![MemoryEntry::dir("a")]);
        let counts = count_children(&mut large).unwrap();
        let err = build_tree(&mut small, counts).unwrap_err();
        assert!(err.is_internal());
    }

    struct BrokenContent;

    impl Read for BrokenContent {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated layer",
            ))
        }
    }

    struct BrokenSource;

    impl LayerSource for BrokenSource {
        fn layer_count(&self) -> usize {
            1
        }

        fn visit_entries(
            &mut self,
            visitor: &mut dyn FnMut(LayerEntry<'_>) -> Result<()>,
        ) -> Result<()> {
            visitor(LayerEntry {
                layer: 0,
                path: TreePath::new("bin/app"),
                flag: EntryFlag::Regular,
                mode: 0o755,
                mtime: 0,
                link_target: None,
                content: &mut BrokenContent,
            })
        }
    }

    #[test]
    fn test_content_read_failure_is_fatal() {
        let mut source = BrokenSource;
        let counts = count_children(&mut source).unwrap();
        let err = build_tree(&mut source, counts).unwrap_err();
        assert!(matches!(err, SpkError::IoError(_)));
        assert!(!err.is_internal());
        assert!(err.to_string().contains("bin/app"));
    }

    #[test]
    fn test_symlink_without_target_points_nowhere() {
        let bare = MemoryEntry {
            link_target: None,
            ..MemoryEntry::symlink("bare", "unused")
        };
        let mut source = MemoryLayers::new().with_layer(vec![bare]);
        let tree = convert(&mut source).unwrap();
        assert_eq!(tree.find("bare").unwrap().kind, NodeKind::Symlink(String::new()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn entry() -> impl Strategy<Value = MemoryEntry> {
            let path = prop_oneof![
                Just("./".to_string()),
                proptest::collection::vec(proptest::sample::select(vec!["a", "b", "c"]), 1..5)
                    .prop_map(|parts| parts.join("/")),
                proptest::collection::vec(proptest::sample::select(vec!["a", "b"]), 1..4)
                    .prop_map(|parts| format!("./{}/", parts.join("/"))),
            ];
            (path, 0u8..5, 0u64..3).prop_map(|(path, kind, mtime)| {
                let entry = match kind {
                    0 => MemoryEntry::dir(&path),
                    1 => MemoryEntry::file(&path, 0o644, path.as_bytes()),
                    2 => MemoryEntry::file(&path, 0o755, b"x"),
                    3 => MemoryEntry::symlink(&path, "a"),
                    _ => MemoryEntry::other(&path),
                };
                entry.with_mtime(mtime)
            })
        }

        fn layers() -> impl Strategy<Value = Vec<Vec<MemoryEntry>>> {
            proptest::collection::vec(proptest::collection::vec(entry(), 0..16), 1..4)
        }

        fn source(layers: &[Vec<MemoryEntry>]) -> MemoryLayers {
            layers
                .iter()
                .cloned()
                .fold(MemoryLayers::new(), |source, layer| source.with_layer(layer))
        }

        proptest! {
            #[test]
            fn test_any_stream_fills_every_counted_slot(layers in layers()) {
                let mut first = source(&layers);
                let counts = count_children(&mut first).unwrap();
                let tree = build_tree(&mut first, counts.clone());
                prop_assert!(tree.is_ok(), "build failed: {:?}", tree.as_ref().err());
                let tree = tree.unwrap();
                assert_matches_counts(&tree.files, &TreePath::root(), &counts);

                let again = convert(&mut source(&layers)).unwrap();
                prop_assert_eq!(tree, again);
            }
        }
    }
}
