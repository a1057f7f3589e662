//! Iterative Kademlia-style lookup for the peers closest to a target.
//!
//! Built on the same state machine as
//! `query_pool::peers::predicate::PredicateQuery`, stripped of its
//! predicate/value machinery — `LookupPeer` has no matching concept,
//! since this crate only ever runs the plain "find the k closest peers
//! to a target" shape, never a predicate-filtered search.

mod pool;
#[cfg(test)]
mod tests;

pub use pool::LookupPool;

use crate::key::{distance, Distance, Key};
use enr::NodeId;
use std::collections::btree_map::{BTreeMap, Entry};
use std::iter::FromIterator;

/// Tuning knobs for a single lookup.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// `alpha`: permitted parallelism while `Iterating`.
    pub parallelism: usize,
    /// `k`: number of results the lookup collects before finishing.
    pub num_results: usize,
    /// `beta`: maximum FINDNODE iterations issued to a single peer.
    pub max_iterations_per_peer: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        LookupConfig {
            parallelism: 3,
            num_results: 16,
            max_iterations_per_peer: 3,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum LookupProgress {
    /// Converging on the target; `no_progress` counts consecutive
    /// `on_success` calls that found no closer peer.
    Iterating { no_progress: usize },
    /// No progress for `alpha * max_iterations_per_peer` consecutive
    /// results; parallelism is relaxed to `k` to try to squeeze out the
    /// last few responses before giving up.
    Stalled,
    Finished,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LookupPeerState {
    NotContacted,
    Waiting,
    PendingIteration,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
struct LookupPeer {
    key: Key<NodeId>,
    iteration: usize,
    peers_returned: usize,
    state: LookupPeerState,
}

impl LookupPeer {
    fn new(key: Key<NodeId>, state: LookupPeerState) -> Self {
        LookupPeer {
            key,
            iteration: 1,
            peers_returned: 0,
            state,
        }
    }
}

/// What the driver should do after calling [`Lookup::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupEvent {
    /// Issue a FINDNODE to `node_id`; this is its `iteration`-th RPC within
    /// this lookup.
    Peer { node_id: NodeId, iteration: usize },
    /// At capacity for the current progress state; nothing to do until an
    /// outstanding result comes back via `on_success`/`on_failure`.
    WaitingAtCapacity,
    /// The lookup is done. Carries the peers that succeeded, nearest-first.
    Finished(Vec<NodeId>),
}

/// A single iterative lookup for the peers closest to `target`.
pub struct Lookup {
    target: NodeId,
    target_key: Key<NodeId>,
    progress: LookupProgress,
    closest_peers: BTreeMap<Distance, LookupPeer>,
    config: LookupConfig,
    num_waiting: usize,
}

impl Lookup {
    /// Seeds the lookup with up to `config.num_results` known-closest peers
    /// (e.g. from a routing table).
    pub fn new<I>(config: LookupConfig, target: NodeId, known_closest_peers: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        let target_key = Key::from(target.clone());
        let closest_peers = BTreeMap::from_iter(
            known_closest_peers
                .into_iter()
                .map(Key::from)
                .map(|key| {
                    let d = key.distance(&target_key);
                    (d, LookupPeer::new(key, LookupPeerState::NotContacted))
                })
                .take(config.num_results),
        );
        Lookup {
            target,
            target_key,
            progress: LookupProgress::Iterating { no_progress: 0 },
            closest_peers,
            config,
            num_waiting: 0,
        }
    }

    pub fn target(&self) -> &NodeId {
        &self.target
    }

    pub fn progress(&self) -> &LookupProgress {
        &self.progress
    }

    pub fn num_waiting(&self) -> usize {
        self.num_waiting
    }

    fn at_capacity(&self) -> bool {
        match self.progress {
            LookupProgress::Stalled => self.num_waiting >= self.config.num_results,
            LookupProgress::Iterating { .. } => self.num_waiting >= self.config.parallelism,
            LookupProgress::Finished => true,
        }
    }

    /// Records a FINDNODE success. `closer_peers` are the ENRs' node ids
    /// the contacted peer claims are closer to the target.
    pub fn on_success(&mut self, node_id: &NodeId, closer_peers: Vec<NodeId>) {
        if self.progress == LookupProgress::Finished {
            return;
        }

        let key = Key::from(node_id.clone());
        let peer_distance = key.distance(&self.target_key);
        let num_closest = self.closest_peers.len();

        match self.closest_peers.entry(peer_distance) {
            Entry::Vacant(_) => return,
            Entry::Occupied(mut e) => match e.get().state {
                LookupPeerState::Waiting => {
                    self.num_waiting -= 1;
                    let peer = e.get_mut();
                    peer.peers_returned += closer_peers.len();
                    if peer.peers_returned >= self.config.num_results {
                        peer.state = LookupPeerState::Succeeded;
                    } else if peer.iteration == self.config.max_iterations_per_peer {
                        peer.state = if peer.peers_returned > 0 {
                            LookupPeerState::Succeeded
                        } else {
                            LookupPeerState::Failed
                        };
                    } else {
                        peer.iteration += 1;
                        peer.state = LookupPeerState::PendingIteration;
                    }
                }
                LookupPeerState::NotContacted
                | LookupPeerState::Failed
                | LookupPeerState::PendingIteration
                | LookupPeerState::Succeeded => return,
            },
        }

        // Progress is recomputed after every single insertion below, not
        // once for the whole batch (see DESIGN.md Open Question 3).
        let mut progress = false;
        for closer in closer_peers {
            let key = Key::from(closer.clone());
            let d = self.target_key.distance(&key);
            self.closest_peers
                .entry(d)
                .or_insert_with(|| LookupPeer::new(key, LookupPeerState::NotContacted));
            progress =
                self.closest_peers.keys().next() == Some(&d) || num_closest < self.config.num_results;
        }

        self.progress = match self.progress {
            LookupProgress::Iterating { no_progress } => {
                let no_progress = if progress { 0 } else { no_progress + 1 };
                if no_progress >= self.config.parallelism * self.config.max_iterations_per_peer {
                    LookupProgress::Stalled
                } else {
                    LookupProgress::Iterating { no_progress }
                }
            }
            LookupProgress::Stalled => {
                if progress {
                    LookupProgress::Iterating { no_progress: 0 }
                } else {
                    LookupProgress::Stalled
                }
            }
            LookupProgress::Finished => LookupProgress::Finished,
        };
    }

    /// Records a FINDNODE failure (timeout, decode error, or
    /// `requestFailed`).
    pub fn on_failure(&mut self, node_id: &NodeId) {
        if self.progress == LookupProgress::Finished {
            return;
        }
        let key = Key::from(node_id.clone());
        let d = key.distance(&self.target_key);
        if let Entry::Occupied(mut e) = self.closest_peers.entry(d) {
            if e.get().state == LookupPeerState::Waiting {
                self.num_waiting -= 1;
                e.get_mut().state = LookupPeerState::Failed;
            }
        }
    }

    /// Cancels the lookup outright, regardless of how much progress it
    /// has made. Idempotent: calling this again on an already-finished
    /// lookup just returns the same result set.
    pub fn stop(&mut self) -> LookupEvent {
        self.progress = LookupProgress::Finished;
        LookupEvent::Finished(self.ordered_results())
    }

    /// Advances scheduling, walking `closest_peers` in ascending distance
    /// to the target.
    pub fn next(&mut self) -> LookupEvent {
        if self.progress == LookupProgress::Finished {
            return LookupEvent::Finished(self.ordered_results());
        }

        let mut result_counter = Some(0usize);
        let at_capacity = self.at_capacity();

        for peer in self.closest_peers.values_mut() {
            match peer.state {
                LookupPeerState::NotContacted | LookupPeerState::PendingIteration => {
                    if at_capacity {
                        return LookupEvent::WaitingAtCapacity;
                    }
                    peer.state = LookupPeerState::Waiting;
                    self.num_waiting += 1;
                    return LookupEvent::Peer {
                        node_id: peer.key.preimage().clone(),
                        iteration: peer.iteration,
                    };
                }
                LookupPeerState::Waiting => {
                    if at_capacity {
                        return LookupEvent::WaitingAtCapacity;
                    }
                    // A closer peer is still outstanding; we cannot count
                    // towards termination yet.
                    result_counter = None;
                }
                LookupPeerState::Succeeded => {
                    if let Some(count) = result_counter.as_mut() {
                        *count += 1;
                        if *count >= self.config.num_results {
                            self.progress = LookupProgress::Finished;
                            return LookupEvent::Finished(self.ordered_results());
                        }
                    }
                }
                LookupPeerState::Failed => {}
            }
        }

        if self.num_waiting > 0 {
            LookupEvent::WaitingAtCapacity
        } else {
            self.progress = LookupProgress::Finished;
            LookupEvent::Finished(self.ordered_results())
        }
    }

    /// Repeatedly calls `next` until it stops producing new peers to
    /// contact, returning every `Peer` event issued.
    pub fn start(&mut self) -> Vec<LookupEvent> {
        let mut events = Vec::new();
        loop {
            match self.next() {
                event @ LookupEvent::Peer { .. } => events.push(event),
                event => {
                    events.push(event);
                    break;
                }
            }
        }
        events
    }

    fn ordered_results(&self) -> Vec<NodeId> {
        self.closest_peers
            .values()
            .filter(|peer| peer.state == LookupPeerState::Succeeded)
            .map(|peer| peer.key.preimage().clone())
            .collect()
    }
}

/// Free function matching the XOR metric used elsewhere in this crate;
/// re-exported here since lookups are the primary consumer.
pub fn node_distance(a: &NodeId, b: &NodeId) -> Distance {
    distance(a, b)
}
