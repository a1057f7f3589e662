//! Multi-lookup driver: runs several [`Lookup`]s side by side and reports
//! which one next needs attention.
//!
//! Built on the same shape as `query_new::QueryPool` — a generic
//! ID-keyed pool polled round-robin for the first query that is either
//! ready to contact a peer or finished. Its `QueryPeerIter` wrapper (a
//! one-variant enum selecting between peer-selection strategies) has no
//! counterpart here: this crate only ever runs the one `Lookup` shape,
//! so `LookupPool` holds `Lookup`s directly.

use super::{Lookup, LookupEvent};
use enr::NodeId;
use fnv::FnvHashMap;

/// Opaque handle to a lookup registered with a [`LookupPool`].
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct LookupId(usize);

/// Observable states emitted by [`LookupPool::poll`].
pub enum LookupPoolState<'a> {
    /// No lookups registered.
    Idle,
    /// A lookup wants a peer contacted; the driver should issue a
    /// FINDNODE to it and eventually call `on_success`/`on_failure`.
    Waiting(Option<(LookupId, &'a mut Lookup, NodeId, usize)>),
    /// A lookup finished; it has been removed from the pool.
    Finished(LookupId, Vec<NodeId>),
}

/// Drives a set of concurrently active lookups.
#[derive(Default)]
pub struct LookupPool {
    next_id: usize,
    lookups: FnvHashMap<LookupId, Lookup>,
}

impl LookupPool {
    pub fn new() -> Self {
        LookupPool {
            next_id: 0,
            lookups: Default::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// Registers a lookup, returning a handle for later `on_success`/
    /// `on_failure` calls.
    pub fn insert(&mut self, lookup: Lookup) -> LookupId {
        let id = LookupId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.lookups.insert(id, lookup);
        id
    }

    pub fn get_mut(&mut self, id: &LookupId) -> Option<&mut Lookup> {
        self.lookups.get_mut(id)
    }

    /// Cancels an active lookup outright instead of waiting for it to
    /// finish naturally: transitions it to `Finished` via [`Lookup::stop`]
    /// and removes it from the pool, returning the `finished` results it
    /// had collected so far.
    pub fn stop(&mut self, id: &LookupId) -> Option<Vec<NodeId>> {
        let mut lookup = self.lookups.remove(id)?;
        match lookup.stop() {
            LookupEvent::Finished(results) => Some(results),
            _ => unreachable!("Lookup::stop always returns Finished"),
        }
    }

    pub fn on_success(&mut self, id: &LookupId, node_id: &NodeId, closer_peers: Vec<NodeId>) {
        if let Some(lookup) = self.lookups.get_mut(id) {
            lookup.on_success(node_id, closer_peers);
        }
    }

    pub fn on_failure(&mut self, id: &LookupId, node_id: &NodeId) {
        if let Some(lookup) = self.lookups.get_mut(id) {
            lookup.on_failure(node_id);
        }
    }

    /// Advances every registered lookup, returning the first one that
    /// either wants a peer contacted or has finished.
    pub fn poll(&mut self) -> LookupPoolState<'_> {
        let mut finished = None;
        let mut waiting = None;

        for (&id, lookup) in self.lookups.iter_mut() {
            match lookup.next() {
                LookupEvent::Finished(results) => {
                    finished = Some((id, results));
                    break;
                }
                LookupEvent::Peer { node_id, iteration } => {
                    waiting = Some((id, node_id, iteration));
                    break;
                }
                LookupEvent::WaitingAtCapacity => {}
            }
        }

        if let Some((id, node_id, iteration)) = waiting {
            let lookup = self.lookups.get_mut(&id).expect("just matched above");
            return LookupPoolState::Waiting(Some((id, lookup, node_id, iteration)));
        }

        if let Some((id, results)) = finished {
            self.lookups.remove(&id);
            return LookupPoolState::Finished(id, results);
        }

        if self.lookups.is_empty() {
            LookupPoolState::Idle
        } else {
            LookupPoolState::Waiting(None)
        }
    }
}
