use crate::types::{AdEntry, ElementHandle, LibraryId};
use std::collections::HashSet;

/// Insertion-ordered, Library-ID-unique list of every ad seen on the page.
#[derive(Debug, Default)]
pub struct AdRegistry {
    entries: Vec<AdEntry>,
    seen: HashSet<LibraryId>,
}

impl AdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless the Library ID is already tracked. Returns `true` when added.
    pub fn insert(&mut self, library_id: LibraryId, element: ElementHandle) -> bool {
        if !self.seen.insert(library_id.clone()) {
            return false;
        }
        self.entries.push(AdEntry {
            library_id,
            element,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AdEntry] {
        &self.entries
    }

    /// Owned copy for iteration without holding the registry lock.
    pub fn snapshot(&self) -> Vec<AdEntry> {
        self.entries.clone()
    }
}
