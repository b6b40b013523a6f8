//! Normalized slash-separated paths inside the merged tree.

use std::fmt;

/// Name of the tree root.
pub const ROOT: &str = ".";

/// A cleaned, relative, slash-separated path. `"."` is the tree root.
///
/// Two paths compare equal exactly when their normalized forms do, so a
/// `TreePath` can key the maps both passes share.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreePath(String);

impl TreePath {
    /// The tree root.
    pub fn root() -> Self {
        Self(ROOT.to_string())
    }

    /// Normalize a raw archive path.
    ///
    /// Leading slashes, empty components and `.` are dropped, `..` is
    /// resolved lexically and never climbs above the root.
    pub fn new(raw: &str) -> Self {
        let mut parts: Vec<&str> = Vec::new();
        for component in raw.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                name => parts.push(name),
            }
        }
        if parts.is_empty() {
            Self::root()
        } else {
            Self(parts.join("/"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT
    }

    /// Directory containing this path. The root is its own parent.
    pub fn parent(&self) -> TreePath {
        match self.0.rfind('/') {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        }
    }

    /// Final component. The root's base name is `"."`.
    pub fn base(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Proper ancestors, nearest first, ending with the root.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: if self.is_root() {
                None
            } else {
                Some(self.parent())
            },
        }
    }

    /// Path of a direct child called `name`.
    pub fn join(&self, name: &str) -> TreePath {
        if self.is_root() {
            TreePath::new(name)
        } else {
            TreePath::new(&format!("{}/{}", self.0, name))
        }
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TreePath {
    fn from(raw: &str) -> Self {
        TreePath::new(raw)
    }
}

/// Iterator returned by [`TreePath::ancestors`].
pub struct Ancestors {
    next: Option<TreePath>,
}

impl Iterator for Ancestors {
    type Item = TreePath;

    fn next(&mut self) -> Option<TreePath> {
        let current = self.next.take()?;
        if !current.is_root() {
            self.next = Some(current.parent());
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_noise() {
        assert_eq!(TreePath::new("./usr//bin/").as_str(), "usr/bin");
        assert_eq!(TreePath::new("/etc/passwd").as_str(), "etc/passwd");
        assert_eq!(TreePath::new("a/./b").as_str(), "a/b");
    }

    #[test]
    fn test_normalize_resolves_dot_dot() {
        assert_eq!(TreePath::new("a/b/../c").as_str(), "a/c");
        assert_eq!(TreePath::new("../../etc").as_str(), "etc");
        assert_eq!(TreePath::new("a/..").as_str(), ".");
    }

    #[test]
    fn test_empty_and_dot_are_root() {
        assert!(TreePath::new("").is_root());
        assert!(TreePath::new(".").is_root());
        assert!(TreePath::new("./").is_root());
        assert!(TreePath::new("/").is_root());
    }

    #[test]
    fn test_equality_uses_normalized_form() {
        assert_eq!(TreePath::new("./x/y"), TreePath::new("x//y/"));
        assert_ne!(TreePath::new("x/y"), TreePath::new("x/Y"));
    }

    #[test]
    fn test_parent() {
        assert_eq!(TreePath::new("x/y/z.txt").parent().as_str(), "x/y");
        assert_eq!(TreePath::new("x").parent().as_str(), ".");
        assert!(TreePath::root().parent().is_root());
    }

    #[test]
    fn test_base() {
        assert_eq!(TreePath::new("x/y/z.txt").base(), "z.txt");
        assert_eq!(TreePath::new("sandstorm-manifest").base(), "sandstorm-manifest");
        assert_eq!(TreePath::root().base(), ".");
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let ancestors: Vec<String> = TreePath::new("x/y/z.txt")
            .ancestors()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(ancestors, vec!["x/y", "x", "."]);
        assert_eq!(TreePath::root().ancestors().count(), 0);
    }

    #[test]
    fn test_join() {
        assert_eq!(TreePath::root().join("etc").as_str(), "etc");
        assert_eq!(TreePath::new("etc").join("hosts").as_str(), "etc/hosts");
    }
}
