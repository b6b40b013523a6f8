//! Finished tree nodes handed to the sink.

use super::path::TreePath;

/// A named entry of the merged tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    /// Last modification time in nanoseconds (0 for implied directories)
    pub modified_ns: i64,
    pub kind: NodeKind,
}

/// Node contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Children in slot order; the length was fixed when the directory was created.
    Directory(Vec<Node>),
    Regular(Vec<u8>),
    Executable(Vec<u8>),
    Symlink(String),
}

impl Node {
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    /// Children of a directory, empty for anything else.
    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Directory(children) => children,
            _ => &[],
        }
    }

    /// File content for regular and executable files.
    pub fn content(&self) -> Option<&[u8]> {
        match &self.kind {
            NodeKind::Regular(bytes) | NodeKind::Executable(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Tallies over a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub directories: usize,
    pub files: usize,
    pub executables: usize,
    pub symlinks: usize,
    /// Total file content size
    pub bytes: u64,
}

/// Result of the building pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTree {
    /// Children of the root, in slot order
    pub files: Vec<Node>,
    /// Whether a top-level `sandstorm-manifest` exists
    pub manifest_present: bool,
}

impl BuiltTree {
    /// Look up a node by path. The root itself has no node.
    pub fn find(&self, path: &str) -> Option<&Node> {
        find_in(&self.files, &TreePath::new(path))
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        tally(&self.files, &mut stats);
        stats
    }
}

/// Find `path` below a list of root children.
pub fn find_in<'a>(files: &'a [Node], path: &TreePath) -> Option<&'a Node> {
    if path.is_root() {
        return None;
    }
    let mut current = files;
    let mut found = None;
    for name in path.as_str().split('/') {
        let node = current.iter().find(|node| node.name == name)?;
        current = node.children();
        found = Some(node);
    }
    found
}

fn tally(nodes: &[Node], stats: &mut TreeStats) {
    for node in nodes {
        match &node.kind {
            NodeKind::Directory(children) => {
                stats.directories += 1;
                tally(children, stats);
            }
            NodeKind::Regular(bytes) => {
                stats.files += 1;
                stats.bytes += bytes.len() as u64;
            }
            NodeKind::Executable(bytes) => {
                stats.executables += 1;
                stats.bytes += bytes.len() as u64;
            }
            NodeKind::Symlink(_) => stats.symlinks += 1,
        }
    }
}
