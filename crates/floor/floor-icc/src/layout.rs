//! Shared memory layout of a queue file.
//!
//! # Memory Layout
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      StorePreamble (64B)                       │
//! │  ┌──────────┬──────────┬────────────┬───────────┬───────────┐  │
//! │  │  magic   │ version  │ header_len │ queue_len │  padding  │  │
//! │  └──────────┴──────────┴────────────┴───────────┴───────────┘  │
//! ├────────────────────────────────────────────────────────────────┤
//! │              Header region (header_len bytes)                  │
//! │  SWQ: write_pos                                                │
//! │  MWQ: write_pos | dirty_pos | ready_pos, one cache line each   │
//! ├────────────────────────────────────────────────────────────────┤
//! │              Data region (queue_len bytes, circular)           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The heap backing uses the same header/data split without the preamble.

use std::sync::atomic::{AtomicU64, Ordering};

pub const CACHE_LINE: usize = 64;

/// ASCII "FLOORQUE".
pub const STORE_MAGIC: u64 = 0x464C_4F4F_5251_5545;

/// Bump on any incompatible layout change.
pub const STORE_VERSION: u64 = 1;

pub const PREAMBLE_LEN: usize = size_of::<StorePreamble>();

/// Header region of a single-writer queue: one counter.
pub const SWQ_HEADER_LEN: usize = CACHE_LINE;
pub const SWQ_WRITE_POS: usize = 0;

/// Header region of a multi-writer queue: three counters, each on its own
/// cache line.
pub const MWQ_HEADER_LEN: usize = 3 * CACHE_LINE;
pub const MWQ_WRITE_POS: usize = 0;
pub const MWQ_DIRTY_POS: usize = CACHE_LINE / 8;
pub const MWQ_READY_POS: usize = 2 * CACHE_LINE / 8;

#[repr(C, align(64))]
pub struct StorePreamble {
    /// Written last during initialization; zero means "not ready".
    pub magic: AtomicU64,
    pub version: u64,
    pub header_len: u64,
    pub queue_len: u64,
}

impl StorePreamble {
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.magic.load(Ordering::Acquire) != 0
    }
}

/// Header lengths are kept to whole cache lines so the data region stays
/// aligned and counters never share a line with payload.
#[inline]
pub fn round_header_len(header_len: usize) -> usize {
    header_len.div_ceil(CACHE_LINE).max(1) * CACHE_LINE
}

/// Total bytes for a mapped queue file.
pub fn bytes_for_store(header_len: usize, queue_len: u64) -> u64 {
    (PREAMBLE_LEN + round_header_len(header_len)) as u64 + queue_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_is_one_cache_line() {
        assert_eq!(PREAMBLE_LEN, CACHE_LINE);
    }

    #[test]
    fn mwq_counters_do_not_share_cache_lines() {
        let offsets = [MWQ_WRITE_POS * 8, MWQ_DIRTY_POS * 8, MWQ_READY_POS * 8];
        assert_eq!(offsets, [0, 64, 128]);
        assert!(MWQ_READY_POS * 8 + 8 <= MWQ_HEADER_LEN);
    }

    #[test]
    fn header_len_rounds_to_cache_lines() {
        assert_eq!(round_header_len(0), 64);
        assert_eq!(round_header_len(8), 64);
        assert_eq!(round_header_len(65), 128);
        assert_eq!(round_header_len(MWQ_HEADER_LEN), MWQ_HEADER_LEN);
    }
}
