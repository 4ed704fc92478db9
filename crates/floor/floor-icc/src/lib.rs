//! Lock-free shared-memory queues.
//!
//! Three queue flavours sit on top of a [`CircularStore`]:
//! - [`swq`]: one writer, many readers, fixed-size messages, lossy for slow readers.
//! - [`mwq_var`]: many writers, many readers, length-prefixed messages.
//! - [`mwq_fixed`]: many writers, many readers, equal-size slots.
//!
//! Positions ([`QPos`]) are monotonically increasing byte offsets that never
//! repeat for the lifetime of a queue; storage is addressed modulo the queue
//! length.

mod config;
mod error;
mod layout;
mod mwq;
pub mod mwq_fixed;
pub mod mwq_var;
mod store;
pub mod swq;

pub use config::QueueConfig;
pub use error::{QueueError, StoreError, WriteError};
pub use layout::{MWQ_HEADER_LEN, SWQ_HEADER_LEN};
pub use mwq::{Claim, Positions};
pub use mwq_fixed::{FixedQueue, FixedReader, FixedWriter};
pub use mwq_var::{VarQueue, VarReader, VarWriter};
pub use store::{CircularStore, HeapStore, MmapStore, OpenMode};
pub use swq::{Swq, SwqReader, SwqWriter};

/// Byte position within a queue. Physical offset is `pos % queue_len`.
pub type QPos = u64;
