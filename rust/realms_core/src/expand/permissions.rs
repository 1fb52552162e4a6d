//! Permission interning.
//!
//! Permissions are handled as dense integers while realms are expanded. The
//! integers depend on the order permissions were first seen, so they are
//! relabeled at the end to match positions in the sorted permission list.

use string_interner::{DefaultStringInterner, Symbol};

use crate::types::PermIdx;

/// Assigns dense indexes to permission names in first-use order.
#[derive(Debug, Default)]
pub struct PermissionInterner {
    interner: DefaultStringInterner,
}

/// Result of `PermissionInterner::finalize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedPermissions {
    /// All interned names, sorted alphabetically.
    pub names: Vec<String>,
    /// `old_to_new[old]` is the position of that permission in `names`.
    pub old_to_new: Vec<PermIdx>,
}

impl SortedPermissions {
    /// Relabel an interned index to its final position.
    #[inline]
    pub fn remap(&self, old: PermIdx) -> PermIdx {
        self.old_to_new[old as usize]
    }
}

impl PermissionInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the given permission, assigning a fresh one on first sight.
    pub fn intern(&mut self, name: &str) -> PermIdx {
        self.interner.get_or_intern(name).to_usize() as PermIdx
    }

    pub fn len(&self) -> usize {
        self.interner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }

    /// Sort all interned names and compute the old -> new index mapping.
    ///
    /// Consumes the interner: nothing can be interned afterwards.
    pub fn finalize(self) -> SortedPermissions {
        let mut entries: Vec<(&str, usize)> = self
            .interner
            .iter()
            .map(|(sym, name)| (name, sym.to_usize()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut old_to_new = vec![0 as PermIdx; entries.len()];
        for (new_idx, &(_, old_idx)) in entries.iter().enumerate() {
            old_to_new[old_idx] = new_idx as PermIdx;
        }

        SortedPermissions {
            names: entries.into_iter().map(|(name, _)| name.to_string()).collect(),
            old_to_new,
        }
    }
}
