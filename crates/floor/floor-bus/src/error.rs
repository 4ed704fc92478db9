use floor_icc::{StoreError, WriteError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to open bus '{name}'")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid bus geometry (queue {queue_len} bytes, slot {slot_size} bytes): {reason}")]
    Geometry {
        queue_len: u64,
        slot_size: usize,
        reason: &'static str,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    /// Slot size bounds message size; oversized payloads never reach the queue.
    #[error("payload of {size} bytes exceeds the {max} byte slot payload")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("timed out")]
    Timeout { after: Duration },

    /// The responder answered with something other than an ack.
    #[error("{0}")]
    Nack(String),
}
