//! Claim/finalize protocol shared by the multi-writer queues.
//!
//! Writers reserve bytes by advancing `write_pos`, copy their message, then
//! add the same count to `dirty_pos`. Whoever brings `dirty_pos` level with
//! `write_pos` knows every outstanding claim has completed and moves the
//! `ready_pos` watermark up to it. Readers only trust `ready_pos`, so a late
//! writer holds back everything claimed after it and messages become visible
//! in claim order no matter which writer finishes first.

use crate::QPos;
use crate::config::QueueConfig;
use crate::error::WriteError;
use crate::layout::{MWQ_DIRTY_POS, MWQ_HEADER_LEN, MWQ_READY_POS, MWQ_WRITE_POS};
use crate::store::CircularStore;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU64, Ordering};
use std::time::Instant;

/// Snapshot of the three shared counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Positions {
    pub write: QPos,
    pub dirty: QPos,
    pub ready: QPos,
}

/// Store handle plus configuration, cloned into every writer and reader.
pub(crate) struct Mwq<S: CircularStore + ?Sized> {
    pub(crate) store: Arc<S>,
    pub(crate) cfg: QueueConfig,
}

impl<S: CircularStore + ?Sized> Clone for Mwq<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cfg: self.cfg,
        }
    }
}

impl<S: CircularStore + ?Sized> Mwq<S> {
    /// # Panics
    /// Panics if the store does not match the configured geometry.
    pub(crate) fn new(store: Arc<S>, cfg: QueueConfig) -> Self {
        assert_eq!(store.capacity(), cfg.queue_len, "store length differs from queue_len");
        assert!(
            store.header().len() * 8 >= MWQ_HEADER_LEN,
            "store header too small for a multi-writer queue"
        );
        Self { store, cfg }
    }

    #[inline(always)]
    pub(crate) fn write_pos(&self) -> &AtomicU64 {
        &self.store.header()[MWQ_WRITE_POS]
    }

    #[inline(always)]
    pub(crate) fn dirty_pos(&self) -> &AtomicU64 {
        &self.store.header()[MWQ_DIRTY_POS]
    }

    #[inline(always)]
    pub(crate) fn ready_pos(&self) -> &AtomicU64 {
        &self.store.header()[MWQ_READY_POS]
    }

    pub(crate) fn positions(&self) -> Positions {
        Positions {
            write: self.write_pos().load(Ordering::Acquire),
            dirty: self.dirty_pos().load(Ordering::Acquire),
            ready: self.ready_pos().load(Ordering::Acquire),
        }
    }

    /// Reserve `n` bytes and return the start of the reserved span.
    ///
    /// The fast path is a single `fetch_add`. When too much is in flight the
    /// writer spins until the watermark catches up, then claims with a CAS so
    /// two spinning writers cannot both claim past the same stale snapshot.
    pub(crate) fn claim(&self, n: u64) -> Result<QPos, WriteError> {
        let write_pos = self.write_pos();
        let ready_pos = self.ready_pos();
        let threshold = self.cfg.spin_threshold;

        let mut w = write_pos.load(Ordering::Acquire);
        if w.saturating_sub(ready_pos.load(Ordering::Acquire)) <= threshold {
            return Ok(write_pos.fetch_add(n, Ordering::AcqRel));
        }

        let started = Instant::now();
        loop {
            let r = ready_pos.load(Ordering::Acquire);
            if w.saturating_sub(r) <= threshold {
                match write_pos.compare_exchange_weak(w, w + n, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(_) => return Ok(w),
                    Err(current) => {
                        w = current;
                        continue;
                    }
                }
            }

            if let Some(limit) = self.cfg.claim_timeout {
                if started.elapsed() >= limit {
                    tracing::warn!(write_pos = w, ready_pos = r, "claim stalled behind unfinished writers");
                    return Err(WriteError::Stalled {
                        write_pos: w,
                        ready_pos: r,
                    });
                }
            }

            if self.cfg.backoff.is_zero() {
                std::hint::spin_loop();
            } else {
                std::thread::sleep(self.cfg.backoff);
            }
            w = write_pos.load(Ordering::Acquire);
        }
    }

    /// Mark `n` claimed bytes as written and advance the watermark if no
    /// other claim is still in flight.
    pub(crate) fn commit(&self, n: u64) {
        let dirty = self.dirty_pos().fetch_add(n, Ordering::AcqRel) + n;
        if dirty != self.write_pos().load(Ordering::Acquire) {
            return;
        }

        let ready_pos = self.ready_pos();
        let mut ready = ready_pos.load(Ordering::Acquire);
        // another finalizer may already have moved it further
        while ready < dirty {
            match ready_pos.compare_exchange_weak(ready, dirty, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(current) => ready = current,
            }
        }
    }

    /// True if a reader at `read_pos` may have had its bytes overwritten.
    #[inline]
    pub(crate) fn lapped(&self, read_pos: QPos) -> bool {
        atomic::fence(Ordering::Acquire);
        self.write_pos().load(Ordering::Acquire).saturating_sub(read_pos) >= self.cfg.queue_len
    }
}

/// A reserved span that has not been published yet.
///
/// Dropping an uncommitted claim zero-fills its body and commits it anyway;
/// an abandoned claim would otherwise hold back the watermark forever.
pub struct Claim<'a, S: CircularStore + ?Sized> {
    mwq: &'a Mwq<S>,
    pos: QPos,
    /// Bytes before the body (the length prefix of variable-length queues).
    prefix: usize,
    body: usize,
    committed: bool,
}

impl<'a, S: CircularStore + ?Sized> Claim<'a, S> {
    pub(crate) fn new(mwq: &'a Mwq<S>, pos: QPos, prefix: usize, body: usize) -> Self {
        Self {
            mwq,
            pos,
            prefix,
            body,
            committed: false,
        }
    }

    /// Start of the claimed span. Unique for the lifetime of the queue.
    #[inline]
    pub fn pos(&self) -> QPos {
        self.pos
    }

    /// Body length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.body
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body == 0
    }

    /// Copy `bytes` into the body at `offset`.
    ///
    /// # Panics
    /// Panics if the write would run past the claimed body.
    #[inline]
    pub fn write(&mut self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.body, "write past the end of the claim");
        let at = self.pos + (self.prefix + offset) as u64;
        self.mwq.store.copy_in(at, bytes);
    }

    /// Publish the claim. Returns its position.
    pub fn commit(mut self) -> QPos {
        self.committed = true;
        self.mwq.commit((self.prefix + self.body) as u64);
        self.pos
    }
}

impl<S: CircularStore + ?Sized> Drop for Claim<'_, S> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        tracing::warn!(pos = self.pos, len = self.body, "claim dropped without commit; publishing zeros");
        let zeros = vec![0u8; self.body];
        self.write(0, &zeros);
        self.mwq.commit((self.prefix + self.body) as u64);
    }
}
