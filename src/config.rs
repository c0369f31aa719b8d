use std::time::Duration;

/// Tunable constants for the reliable-datagram path. The `Default` impl
/// matches the literal values in the specification; tests construct their
/// own `TransportConfig` with a shorter retransmit interval so a lossy
/// round trip does not have to wait out a full 100 ms.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Send window capacity (`W` in the spec).
    pub window_capacity: usize,
    /// Minimum time between retransmissions of the same slot.
    pub retransmit_interval: Duration,
    /// Receive timeout used on handshake and ACK-collection reads.
    pub recv_timeout: Duration,
    /// Number of `SYN` attempts the initiator makes before giving up.
    pub handshake_retries: u32,
    /// How often the background engine loop wakes when it has nothing to do.
    pub poll_interval: Duration,
    /// Opt-in cap on unacknowledged retransmissions of a single slot before
    /// the connection is marked `PeerUnreachable`. `None` preserves the
    /// spec's default of indefinite retransmission.
    pub max_retransmits: Option<u32>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            window_capacity: crate::window::DEFAULT_WINDOW_CAPACITY,
            retransmit_interval: Duration::from_millis(100),
            recv_timeout: Duration::from_secs(1),
            handshake_retries: 3,
            poll_interval: Duration::from_millis(1),
            max_retransmits: None,
        }
    }
}
