//! Queue geometry and multi-writer backpressure settings.

use std::time::Duration;

/// Configuration shared by every writer and reader of one queue.
///
/// `slot_size` is the message size for fixed-size queues and the maximum
/// encoded message size (length prefix included) for variable-length ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Size of the circular data region in bytes (`QLen`).
    pub queue_len: u64,
    pub slot_size: usize,
    /// A multi-writer spins while `write_pos - ready_pos` exceeds this.
    pub spin_threshold: u64,
    /// How long a multi-writer may spin before giving up. `None` spins forever.
    pub claim_timeout: Option<Duration>,
    /// Sleep between backpressure re-checks. Zero busy-spins.
    pub backoff: Duration,
}

impl QueueConfig {
    /// # Panics
    /// Panics if `slot_size` is zero or larger than half the queue.
    pub fn new(queue_len: u64, slot_size: usize) -> Self {
        assert!(slot_size > 0, "slot size must be non-zero");
        assert!(
            slot_size as u64 <= queue_len / 2,
            "slot size {slot_size} does not fit twice in a queue of {queue_len} bytes"
        );
        Self {
            queue_len,
            slot_size,
            spin_threshold: queue_len / 2,
            claim_timeout: Some(Duration::from_secs(1)),
            backoff: Duration::from_micros(1),
        }
    }

    /// # Panics
    /// Panics if a claim at the threshold could wrap onto itself.
    pub fn with_spin_threshold(mut self, spin_threshold: u64) -> Self {
        assert!(
            spin_threshold + self.slot_size as u64 <= self.queue_len,
            "spin threshold {spin_threshold} leaves no room for a slot"
        );
        self.spin_threshold = spin_threshold;
        self
    }

    pub fn with_claim_timeout(mut self, claim_timeout: Option<Duration>) -> Self {
        self.claim_timeout = claim_timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Number of whole slots the queue holds.
    #[inline]
    pub fn slots(&self) -> u64 {
        self.queue_len / self.slot_size as u64
    }
}
