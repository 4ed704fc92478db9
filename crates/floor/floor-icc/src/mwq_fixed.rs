//! Multi-writer queue with equal-size slots.
//!
//! Every claim is exactly `slot_size` bytes, so positions are always whole
//! multiples of the slot size and no length prefix is needed. This is the
//! queue the bus runs on.

use crate::QPos;
use crate::config::QueueConfig;
use crate::error::{QueueError, WriteError};
use crate::mwq::{Claim, Mwq, Positions};
use crate::store::CircularStore;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Handle to one fixed-slot queue. Cheap to clone; hands out writers and
/// readers.
pub struct FixedQueue<S: CircularStore + ?Sized> {
    mwq: Mwq<S>,
}

impl<S: CircularStore + ?Sized> Clone for FixedQueue<S> {
    fn clone(&self) -> Self {
        Self {
            mwq: self.mwq.clone(),
        }
    }
}

impl<S: CircularStore + ?Sized> FixedQueue<S> {
    pub fn new(store: Arc<S>, cfg: QueueConfig) -> Self {
        Self {
            mwq: Mwq::new(store, cfg),
        }
    }

    pub fn writer(&self) -> FixedWriter<S> {
        FixedWriter {
            mwq: self.mwq.clone(),
        }
    }

    /// A reader positioned after the last published message.
    pub fn reader(&self) -> FixedReader<S> {
        let ready = self.mwq.ready_pos().load(Ordering::Acquire);
        self.reader_at(ready)
    }

    pub fn reader_at(&self, pos: QPos) -> FixedReader<S> {
        FixedReader {
            mwq: self.mwq.clone(),
            read_pos: pos,
            scratch: vec![0u8; self.mwq.cfg.slot_size],
            overflows: 0,
        }
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        self.mwq.cfg.slot_size
    }

    #[inline]
    pub fn config(&self) -> &QueueConfig {
        &self.mwq.cfg
    }

    pub fn positions(&self) -> Positions {
        self.mwq.positions()
    }
}

/// Writer side. Shareable across threads; every `put` claims its own slot.
pub struct FixedWriter<S: CircularStore + ?Sized> {
    mwq: Mwq<S>,
}

impl<S: CircularStore + ?Sized> FixedWriter<S> {
    /// Write one slot. `content` must be exactly `slot_size` bytes.
    pub fn put(&self, content: &[u8]) -> Result<QPos, WriteError> {
        let slot = self.mwq.cfg.slot_size;
        if content.len() != slot {
            return Err(WriteError::SizeMismatch {
                expected: slot,
                actual: content.len(),
            });
        }
        let mut claim = self.claim()?;
        claim.write(0, content);
        Ok(claim.commit())
    }

    /// Reserve the next slot. The slot becomes visible to readers once the
    /// claim is committed and every earlier claim has been committed too.
    pub fn claim(&self) -> Result<Claim<'_, S>, WriteError> {
        let slot = self.mwq.cfg.slot_size;
        let pos = self.mwq.claim(slot as u64)?;
        Ok(Claim::new(&self.mwq, pos, 0, slot))
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        self.mwq.cfg.slot_size
    }
}

/// Reader side. Holds a private cursor and never mutates shared state.
pub struct FixedReader<S: CircularStore + ?Sized> {
    mwq: Mwq<S>,
    read_pos: QPos,
    /// Landing buffer for slots that wrap the end of the store.
    scratch: Vec<u8>,
    overflows: u64,
}

impl<S: CircularStore + ?Sized> FixedReader<S> {
    /// Check that a whole slot is ready at the cursor.
    fn poll(&mut self) -> Result<QPos, QueueError> {
        let w = self.mwq.write_pos().load(Ordering::Acquire);
        if self.read_pos > w {
            tracing::warn!(read_pos = self.read_pos, write_pos = w, "queue restarted; resyncing to top");
            self.seek_to_top();
        }
        if w.saturating_sub(self.read_pos) >= self.mwq.cfg.queue_len {
            self.overflows += 1;
            return Err(QueueError::Overflow { pos: self.read_pos });
        }
        let ready = self.mwq.ready_pos().load(Ordering::Acquire);
        if ready < self.read_pos + self.mwq.cfg.slot_size as u64 {
            return Err(QueueError::Again);
        }
        Ok(self.read_pos)
    }

    /// Copy the next slot into `out` and advance. Returns the slot position.
    ///
    /// # Panics
    /// Panics if `out` is shorter than a slot.
    pub fn copy_next(&mut self, out: &mut [u8]) -> Result<QPos, QueueError> {
        let slot = self.mwq.cfg.slot_size;
        let pos = self.poll()?;
        self.mwq.store.copy_out(pos, &mut out[..slot]);
        if self.mwq.lapped(pos) {
            self.overflows += 1;
            return Err(QueueError::Overflow { pos });
        }
        self.read_pos = pos + slot as u64;
        Ok(pos)
    }

    /// Borrow the next slot without copying, unless it wraps the end of the
    /// store, in which case it is copied into a private buffer.
    ///
    /// The cursor does not move; call [`advance`](Self::advance) when done.
    /// A borrowed view can be overwritten by writers that lap this reader, so
    /// check [`lapped`](Self::lapped) after consuming it.
    pub fn next_slice(&mut self) -> Result<&[u8], QueueError> {
        let slot = self.mwq.cfg.slot_size;
        let pos = self.poll()?;
        if self.mwq.store.would_cross_boundary(pos, slot) {
            self.mwq.store.copy_out(pos, &mut self.scratch);
            if self.mwq.lapped(pos) {
                self.overflows += 1;
                return Err(QueueError::Overflow { pos });
            }
            return Ok(&self.scratch);
        }
        self.mwq
            .store
            .span(pos, slot)
            .ok_or(QueueError::Malformed { pos })
    }

    /// Step past the slot returned by the last `next_slice`.
    #[inline]
    pub fn advance(&mut self) {
        self.read_pos += self.mwq.cfg.slot_size as u64;
    }

    /// True if writers may have overwritten the slot at the cursor.
    #[inline]
    pub fn lapped(&self) -> bool {
        self.mwq.lapped(self.read_pos)
    }

    /// Read the slot at an arbitrary position without moving the cursor.
    pub fn read_at(&self, pos: QPos, out: &mut [u8]) -> Result<(), QueueError> {
        let slot = self.mwq.cfg.slot_size;
        if pos % slot as u64 != 0 {
            return Err(QueueError::Malformed { pos });
        }
        let ready = self.mwq.ready_pos().load(Ordering::Acquire);
        if pos + slot as u64 > ready {
            return Err(QueueError::Again);
        }
        if self.mwq.lapped(pos) {
            return Err(QueueError::Overflow { pos });
        }
        self.mwq.store.copy_out(pos, &mut out[..slot]);
        if self.mwq.lapped(pos) {
            return Err(QueueError::Overflow { pos });
        }
        Ok(())
    }

    /// Jump to the most recent published slot.
    pub fn seek_to_top(&mut self) {
        let ready = self.mwq.ready_pos().load(Ordering::Acquire);
        self.read_pos = ready.saturating_sub(self.mwq.cfg.slot_size as u64);
    }

    /// Jump past everything published so far.
    pub fn advance_to_top(&mut self) {
        self.read_pos = self.mwq.ready_pos().load(Ordering::Acquire);
    }

    /// Skip whole slots until the cursor is back inside the valid window.
    /// Returns the number of slots skipped.
    pub fn catch_up(&mut self) -> u64 {
        let w = self.mwq.write_pos().load(Ordering::Acquire);
        let behind = w.saturating_sub(self.read_pos);
        if behind < self.mwq.cfg.queue_len {
            return 0;
        }
        let slot = self.mwq.cfg.slot_size as u64;
        let skipped = (behind - self.mwq.cfg.queue_len) / slot + 1;
        self.read_pos += skipped * slot;
        skipped
    }

    pub fn sync_pos(&mut self, pos: QPos) {
        self.read_pos = pos;
    }

    #[inline]
    pub fn pos(&self) -> QPos {
        self.read_pos
    }

    /// Number of overflow events this reader has seen.
    #[inline]
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}
