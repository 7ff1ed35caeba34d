//! Registry of live local pairs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use super::pair::{LocalPair, PairId};

/// Pair creation/destruction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub created: u64,
    pub destroyed: u64,
}

/// Concurrent set of live pairs, keyed by pair id
#[derive(Debug, Default)]
pub struct LocalRegistry {
    pairs: DashMap<PairId, Arc<LocalPair>>,
    names: DashMap<String, PairId>,
    seq: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
}

impl LocalRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Claim `name` for pair `id`; false if a live pair already uses it
    pub(crate) fn reserve_name(&self, name: &str, id: PairId) -> bool {
        match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(id);
                true
            }
        }
    }

    pub(crate) fn link(&self, pair: &Arc<LocalPair>) {
        self.pairs.insert(pair.id(), Arc::clone(pair));
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unlink(&self, pair: &LocalPair) {
        if self.pairs.remove(&pair.id()).is_some() {
            self.destroyed.fetch_add(1, Ordering::Relaxed);
        }
        self.names.remove_if(pair.name(), |_, id| *id == pair.id());
    }

    pub fn get(&self, id: &PairId) -> Option<Arc<LocalPair>> {
        self.pairs.get(id).map(|p| Arc::clone(p.value()))
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<LocalPair>> {
        let id = *self.names.get(name)?.value();
        self.get(&id)
    }

    /// Referenced copy of every live pair, oldest first. No registry lock is
    /// held once this returns.
    pub fn snapshot(&self) -> Vec<Arc<LocalPair>> {
        let mut pairs: Vec<Arc<LocalPair>> = self.pairs.iter().map(|p| Arc::clone(p.value())).collect();
        pairs.sort_by_key(|p| p.seq());
        pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
        }
    }
}
