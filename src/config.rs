//! Tunable constants for the session service and lookup engine.

use std::time::Duration;

/// Maximum size of a single discv5 UDP packet.
pub const MAX_PACKET_SIZE: usize = 1280;

#[derive(Debug, Clone)]
pub struct Discv5Config {
    /// How long an established session may sit idle before it expires.
    pub session_timeout: Duration,
    /// How long a pending (unacknowledged) request waits before it is retried.
    pub request_timeout: Duration,
    /// Number of retransmissions attempted before a pending request is abandoned.
    pub request_retries: u8,
    /// Allowed lookup parallelism (`alpha`) while a lookup is `Iterating`.
    pub lookup_parallelism: usize,
    /// Number of results (`k`) a lookup collects before finishing.
    pub lookup_num_results: usize,
    /// Maximum FINDNODE iterations issued to a single peer within one lookup.
    pub lookup_max_iterations_per_peer: usize,
}

impl Default for Discv5Config {
    fn default() -> Self {
        Discv5Config {
            session_timeout: Duration::from_secs(86_400),
            request_timeout: Duration::from_secs(1),
            request_retries: 2,
            lookup_parallelism: 3,
            lookup_num_results: 16,
            lookup_max_iterations_per_peer: 3,
        }
    }
}
