use crate::store::Store;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A named set of remote stores, keyed by peer address, refreshed as
/// cluster membership changes. `epher-cluster`'s discovery loop owns
/// calling [`Pool::set`]; everything that reads from a pool (the combinator
/// stack) only ever sees a consistent snapshot via [`Pool::members`].
pub struct Pool {
    members: RwLock<HashMap<String, Arc<dyn Store>>>,
}

impl Pool {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the whole membership set atomically.
    pub fn set(&self, members: HashMap<String, Arc<dyn Store>>) {
        *self.members.write() = members;
    }

    pub fn put(&self, addr: impl Into<String>, store: Arc<dyn Store>) {
        self.members.write().insert(addr.into(), store);
    }

    pub fn remove(&self, addr: &str) {
        self.members.write().remove(addr);
    }

    /// A snapshot of the current members, safe to hand to a combinator that
    /// expects a fixed `Vec<Arc<dyn Store>>` (e.g. [`super::race::Race`]).
    pub fn members(&self) -> Vec<Arc<dyn Store>> {
        self.members.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}
