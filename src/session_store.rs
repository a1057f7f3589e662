//! Session Store: a `NodeId -> Session` map with a per-entry expiry
//! timer.
//!
//! Built on the same `HashMap` + `DelayQueue` pairing as
//! `session_service/timed_sessions.rs`'s `TimedSessions`, so each entry
//! carries its own cancellable deadline, reset on re-insertion.
//!
//! Expiry policy (extend vs. remove) depends on the Pending Request
//! Table, which this store does not know about — the two containers
//! stay independent — so `poll_expired` only yields the `NodeId` whose
//! timer fired; the `SessionService` decides whether to call
//! `extend_timeout` or `remove`.

use crate::session::Session;
use core::pin::Pin;
use enr::NodeId;
use futures::Stream;
use std::collections::HashMap;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{delay_queue, DelayQueue};

pub struct SessionStore {
    sessions: HashMap<NodeId, (Session, delay_queue::Key)>,
    timeouts: DelayQueue<NodeId>,
    session_timeout: Duration,
}

impl SessionStore {
    pub fn new(session_timeout: Duration) -> Self {
        SessionStore {
            sessions: HashMap::new(),
            timeouts: DelayQueue::new(),
            session_timeout,
        }
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&Session> {
        self.sessions.get(node_id).map(|(session, _)| session)
    }

    pub fn get_mut(&mut self, node_id: &NodeId) -> Option<&mut Session> {
        self.sessions.get_mut(node_id).map(|(session, _)| session)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.sessions.contains_key(node_id)
    }

    /// Inserts or replaces the session for `node_id`, (re)arming its
    /// timeout at the store's default `session_timeout`.
    pub fn insert(&mut self, node_id: NodeId, session: Session) {
        if let Some((_, key)) = self.sessions.get(&node_id) {
            self.timeouts.reset(key, self.session_timeout);
            self.sessions.get_mut(&node_id).unwrap().0 = session;
        } else {
            let key = self.timeouts.insert(node_id.clone(), self.session_timeout);
            self.sessions.insert(node_id, (session, key));
        }
    }

    pub fn remove(&mut self, node_id: &NodeId) -> Option<Session> {
        self.sessions.remove(node_id).map(|(session, key)| {
            self.timeouts.remove(&key);
            session
        })
    }

    /// Extends (re-arms) a session's expiry to `duration` from now. Used
    /// after a `poll_expired` fires but the Pending Request Table still
    /// has an outstanding request for this peer: the timer slot was
    /// already consumed by expiry, so this installs a fresh one.
    pub fn extend_timeout(&mut self, node_id: &NodeId, duration: Duration) {
        if let Some(entry) = self.sessions.get_mut(node_id) {
            entry.1 = self.timeouts.insert(node_id.clone(), duration);
        }
    }
}

impl Stream for SessionStore {
    /// A `NodeId` whose session timer just fired. The session is *not*
    /// removed here — the caller (`SessionService`) must consult the
    /// Pending Request Table and either call `extend_timeout` (a request
    /// is still outstanding) or `remove` (reap it and fail buffered
    /// messages).
    type Item = NodeId;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let store = self.get_mut();
        match Pin::new(&mut store.timeouts).poll_expired(cx) {
            Poll::Ready(Some(Ok(expired))) => Poll::Ready(Some(expired.into_inner())),
            Poll::Ready(Some(Err(_))) | Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
