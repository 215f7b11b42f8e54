//! Selection Set
//!
//! Ids the user picked out of the current listing. Selecting a folder means
//! its whole subtree at export time.

use std::collections::HashSet;

use crate::file_model::FileEntry;

#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    listing: Vec<FileEntry>,
    selected: HashSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current listing; selected ids that are no longer listed are dropped
    pub fn set_listing(&mut self, entries: Vec<FileEntry>) {
        self.listing = entries;
        let listed: HashSet<&str> = self.listing.iter().map(|e| e.id()).collect();
        self.selected.retain(|id| listed.contains(id.as_str()));
    }

    pub fn listing(&self) -> &[FileEntry] {
        &self.listing
    }

    /// Flip one id. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if !self.listing.iter().any(|e| e.id() == id) {
            return false;
        }
        if self.selected.remove(id) {
            false
        } else {
            self.selected.insert(id.to_string());
            true
        }
    }

    pub fn select_all(&mut self) {
        self.selected = self.listing.iter().map(|e| e.id().to_string()).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Forget both the listing and the selection
    pub fn reset(&mut self) {
        self.listing.clear();
        self.selected.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected entries in listing order
    pub fn selected_entries(&self) -> Vec<FileEntry> {
        self.listing
            .iter()
            .filter(|e| self.selected.contains(e.id()))
            .cloned()
            .collect()
    }
}
