//! Structural ("stub") indices for content whose tree is not loaded.
//!
//! A stub records just enough about a node (its fingerprint and its last
//! known range) for an anchor pointer to hold on to it until the real tree
//! is available, and for compiled/binary content that never gets a tree.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::pointers::{Identikit, TextRange};

/// Index of a node within one file's structural index. Stable across
/// sessions for as long as the index itself is.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct StubId(pub u32);

#[derive(Clone, Debug)]
pub struct StubEntry {
    pub id: StubId,
    pub kit: Arc<Identikit>,
    pub range: TextRange,
}

/// Ordered stub list for one file.
#[derive(Clone, Debug, Default)]
pub struct StubTable {
    entries: Vec<StubEntry>,
}

impl StubTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, assigning the next id.
    pub fn push(&mut self, kit: Arc<Identikit>, range: TextRange) -> StubId {
        let id = StubId(self.entries.len() as u32);
        self.entries.push(StubEntry { id, kit, range });
        id
    }

    pub fn get(&self, id: StubId) -> Option<&StubEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry whose recorded range and fingerprint match the given target,
    /// if any. Used when a pointer is created from an element descriptor
    /// rather than a stub id.
    pub fn find(&self, kit: &Identikit, range: TextRange) -> Option<&StubEntry> {
        self.entries
            .iter()
            .find(|e| e.range == range && *e.kit == *kit)
    }
}
