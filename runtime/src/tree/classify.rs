//! Entry classification.

use super::source::{EntryFlag, LayerEntry};

/// Any of the owner, group or other execute bits.
const EXECUTE_BITS: u32 = 0o111;

/// What a layer entry becomes in the merged tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Directory,
    RegularFile,
    ExecutableFile,
    SymbolicLink,
    /// Excluded from both passes without error.
    Unsupported,
}

impl Classification {
    pub fn is_supported(self) -> bool {
        self != Self::Unsupported
    }

    pub fn is_directory(self) -> bool {
        self == Self::Directory
    }
}

/// Classify a type flag plus permission bits.
pub fn classify(flag: EntryFlag, mode: u32) -> Classification {
    match flag {
        EntryFlag::Directory => Classification::Directory,
        EntryFlag::Regular if mode & EXECUTE_BITS == 0 => Classification::RegularFile,
        EntryFlag::Regular => Classification::ExecutableFile,
        EntryFlag::Symlink => Classification::SymbolicLink,
        EntryFlag::Other => Classification::Unsupported,
    }
}

/// Classify a layer entry.
pub fn classify_entry(entry: &LayerEntry<'_>) -> Classification {
    classify(entry.flag, entry.mode)
}
