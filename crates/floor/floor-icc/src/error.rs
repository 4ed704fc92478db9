use crate::QPos;

/// Outcome of a read that did not produce a message.
///
/// None of these are fatal: readers recover locally by resynchronizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// No new data yet. A normal poll outcome.
    #[error("no new data")]
    Again,

    /// The reader fell behind far enough that unread data may have been
    /// overwritten. Messages are lost to this reader.
    #[error("reader overflowed at position {pos}")]
    Overflow { pos: QPos },

    /// The bytes at the read position do not form a valid message.
    #[error("malformed read state at position {pos}")]
    Malformed { pos: QPos },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("payload is {actual} bytes, slot is {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("message of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    /// Backpressure did not clear before the claim timeout.
    #[error("claim stalled: write_pos {write_pos}, ready_pos {ready_pos}")]
    Stalled { write_pos: QPos, ready_pos: QPos },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to map '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is not a floor queue")]
    BadMagic { path: String },

    #[error("'{path}' has layout version {found}, expected {expected}")]
    VersionMismatch {
        path: String,
        expected: u64,
        found: u64,
    },

    #[error(
        "'{path}' geometry mismatch: header {found_header} (expected {expected_header}), \
         queue {found_len} (expected {expected_len})"
    )]
    Geometry {
        path: String,
        expected_header: u64,
        found_header: u64,
        expected_len: u64,
        found_len: u64,
    },

    /// The file exists but its creator has not finished initializing it.
    #[error("'{path}' is not initialized yet")]
    Uninitialized { path: String },
}
