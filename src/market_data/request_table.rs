// =============================================================================
// Request tracking table
// =============================================================================
//
// Maps every requested series key to the identifier the source knows it by,
// and back.  Entries live in an arena indexed by identifier order; a hash
// index resolves keys.  Identifiers start at 1, only grow, and are never
// reused for the life of the table.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SeriesKey;

/// Identifier of one series request, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a tracked series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesState {
    /// Requested, no bar received yet.
    Pending,
    /// At least one bar received.
    Live,
}

#[derive(Debug, Clone)]
struct Entry {
    id: RequestId,
    key: SeriesKey,
    state: SeriesState,
}

#[derive(Debug)]
pub struct RequestTrackingTable {
    entries: Vec<Entry>,
    by_key: HashMap<SeriesKey, usize>,
    next_id: u64,
}

impl Default for RequestTrackingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTrackingTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_key: HashMap::new(),
            next_id: 1,
        }
    }

    /// Identifier for `key`, allocating a fresh one for an unseen key.
    ///
    /// Returns `(id, true)` when the identifier was just allocated.
    pub fn get_or_allocate(&mut self, key: &SeriesKey) -> (RequestId, bool) {
        if let Some(&slot) = self.by_key.get(key) {
            return (self.entries[slot].id, false);
        }
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.by_key.insert(key.clone(), self.entries.len());
        self.entries.push(Entry {
            id,
            key: key.clone(),
            state: SeriesState::Pending,
        });
        (id, true)
    }

    pub fn id_of(&self, key: &SeriesKey) -> Option<RequestId> {
        self.by_key.get(key).map(|&slot| self.entries[slot].id)
    }

    pub fn key_of(&self, id: RequestId) -> Option<&SeriesKey> {
        self.slot(id).map(|slot| &self.entries[slot].key)
    }

    pub fn state(&self, id: RequestId) -> Option<SeriesState> {
        self.slot(id).map(|slot| self.entries[slot].state)
    }

    pub fn mark_live(&mut self, id: RequestId) {
        if let Some(slot) = self.slot(id) {
            self.entries[slot].state = SeriesState::Live;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Entries are pushed in id order, so a binary search resolves ids.
    fn slot(&self, id: RequestId) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |e| e.id).ok()
    }
}
