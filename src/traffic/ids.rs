//! Identifier cache
//!
//! Keeps a bounded, insertion-ordered set of entity identifiers per entity kind.
//! Identifiers are discovered from create/list responses and reused to build
//! dependent requests (e.g. listing the posts of a known board).
//!
//! Eviction is FIFO by insertion order: once a kind holds more than
//! `max_stored` identifiers, the oldest are dropped. `sample` always returns
//! the oldest surviving identifier so that repeated runs issue the same
//! dependent requests.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of identifiers retained per entity kind
pub const DEFAULT_MAX_STORED: usize = 100;

/// Entity kinds exposed by the target API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Board,
    Post,
    Comment,
}

impl EntityKind {
    /// Label used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Board => "board",
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque entity identifier
///
/// The target API may hand out integer ids or string ids (UUIDs); both are
/// accepted at the parsing boundary and rendered verbatim into request paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{}", id),
            EntityId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Text(id)
    }
}

/// Bounded per-kind identifier store, safe to share across workers
///
/// All operations take `&self`; mutations are serialized by an internal mutex.
#[derive(Debug)]
pub struct IdCache {
    max_stored: usize,
    entries: Mutex<HashMap<EntityKind, VecDeque<EntityId>>>,
}

impl IdCache {
    /// Create an empty cache retaining at most `max_stored` ids per kind
    ///
    /// A limit of zero is raised to one so the cache is never unusable.
    pub fn new(max_stored: usize) -> Self {
        Self {
            max_stored: max_stored.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Maximum number of ids retained per kind
    pub fn max_stored(&self) -> usize {
        self.max_stored
    }

    // A panic while holding the lock cannot leave a half-applied eviction
    // behind, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<EntityKind, VecDeque<EntityId>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `id` for `kind`, evicting the oldest ids beyond `max_stored`
    pub fn record(&self, kind: EntityKind, id: EntityId) {
        let mut entries = self.lock();
        let ids = entries.entry(kind).or_default();
        ids.push_back(id);

        let mut evicted = 0;
        while ids.len() > self.max_stored {
            ids.pop_front();
            evicted += 1;
        }

        if evicted > 0 {
            tracing::trace!(
                kind = %kind,
                evicted,
                retained = ids.len(),
                "Evicted oldest identifiers"
            );
        }
    }

    /// Append every id in order
    pub fn record_all<I>(&self, kind: EntityKind, ids: I)
    where
        I: IntoIterator<Item = EntityId>,
    {
        for id in ids {
            self.record(kind, id);
        }
    }

    /// Oldest surviving id for `kind`, or `None` if nothing was recorded yet
    pub fn sample(&self, kind: EntityKind) -> Option<EntityId> {
        self.lock().get(&kind).and_then(|ids| ids.front().cloned())
    }

    /// Copy of the ids currently retained for `kind`, oldest first
    pub fn snapshot(&self, kind: EntityKind) -> Vec<EntityId> {
        self.lock()
            .get(&kind)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of ids retained for `kind`
    pub fn len(&self, kind: EntityKind) -> usize {
        self.lock().get(&kind).map(VecDeque::len).unwrap_or(0)
    }

    /// Whether nothing is retained for `kind`
    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }
}

impl Default for IdCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STORED)
    }
}
