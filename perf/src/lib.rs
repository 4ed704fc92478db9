use floor_icc::{FixedQueue, MWQ_HEADER_LEN, MmapStore, OpenMode, QueueConfig};
use std::sync::Arc;

pub fn temp_shm_path(label: &str) -> String {
    let pid = std::process::id();
    format!("/tmp/floor_bench_{label}_{pid}")
}

/// A slot of `size` bytes whose first eight carry `seq`.
pub fn make_slot(seq: u64, size: usize) -> Vec<u8> {
    let mut slot = vec![0u8; size];
    slot[..8].copy_from_slice(&seq.to_le_bytes());
    slot
}

/// Fresh file-backed fixed-slot queue at `path`.
///
/// # Panics
/// Panics if the file cannot be mapped.
pub fn mmap_fixed_queue(path: &str, queue_len: u64, slot_size: usize) -> FixedQueue<MmapStore> {
    let store = MmapStore::open(path, MWQ_HEADER_LEN, queue_len, OpenMode::Initialize).expect("failed to map queue");
    FixedQueue::new(Arc::new(store), QueueConfig::new(queue_len, slot_size))
}
