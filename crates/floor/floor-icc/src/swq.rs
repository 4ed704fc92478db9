//! Single-writer, multi-reader queue of fixed-size messages.
//!
//! The writer never waits for anyone: a reader that falls more than a queue
//! length behind gets [`QueueError::Overflow`] and must resynchronize. The
//! writer copies a message first and then advances `write_pos`, so every
//! byte below `write_pos` is complete.

use crate::QPos;
use crate::config::QueueConfig;
use crate::error::{QueueError, WriteError};
use crate::layout::{SWQ_HEADER_LEN, SWQ_WRITE_POS};
use crate::store::CircularStore;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU64, Ordering};

/// Handle to one single-writer queue.
pub struct Swq<S: CircularStore + ?Sized> {
    store: Arc<S>,
    cfg: QueueConfig,
}

impl<S: CircularStore + ?Sized> Clone for Swq<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cfg: self.cfg,
        }
    }
}

impl<S: CircularStore + ?Sized> Swq<S> {
    /// # Panics
    /// Panics if the store does not match the configured geometry.
    pub fn new(store: Arc<S>, cfg: QueueConfig) -> Self {
        assert_eq!(store.capacity(), cfg.queue_len, "store length differs from queue_len");
        assert!(store.header().len() * 8 >= SWQ_HEADER_LEN, "store header too small");
        Self { store, cfg }
    }

    /// The writer. Only one may exist per queue across all processes.
    pub fn writer(&self) -> SwqWriter<S> {
        SwqWriter {
            store: Arc::clone(&self.store),
            slot: self.cfg.slot_size,
        }
    }

    /// A reader that starts at the next message written.
    pub fn reader(&self) -> SwqReader<S> {
        let w = write_pos(&*self.store).load(Ordering::Acquire);
        self.reader_at(w)
    }

    pub fn reader_at(&self, pos: QPos) -> SwqReader<S> {
        SwqReader {
            store: Arc::clone(&self.store),
            slot: self.cfg.slot_size,
            queue_len: self.cfg.queue_len,
            read_pos: pos,
            scratch: vec![0u8; self.cfg.slot_size],
            overflows: 0,
        }
    }

    pub fn write_pos(&self) -> QPos {
        write_pos(&*self.store).load(Ordering::Acquire)
    }
}

#[inline(always)]
fn write_pos<S: CircularStore + ?Sized>(store: &S) -> &AtomicU64 {
    &store.header()[SWQ_WRITE_POS]
}

pub struct SwqWriter<S: CircularStore + ?Sized> {
    store: Arc<S>,
    slot: usize,
}

impl<S: CircularStore + ?Sized> SwqWriter<S> {
    /// Append one message. Never blocks and never checks for slow readers.
    #[inline]
    pub fn put(&mut self, content: &[u8]) -> Result<QPos, WriteError> {
        if content.len() != self.slot {
            return Err(WriteError::SizeMismatch {
                expected: self.slot,
                actual: content.len(),
            });
        }
        let write_pos = write_pos(&*self.store);
        // single writer: nobody else moves write_pos
        let pos = write_pos.load(Ordering::Relaxed);
        self.store.copy_in(pos, content);
        write_pos.store(pos + self.slot as u64, Ordering::Release);
        Ok(pos)
    }

    #[inline]
    pub fn pos(&self) -> QPos {
        write_pos(&*self.store).load(Ordering::Relaxed)
    }
}

pub struct SwqReader<S: CircularStore + ?Sized> {
    store: Arc<S>,
    slot: usize,
    queue_len: u64,
    read_pos: QPos,
    scratch: Vec<u8>,
    overflows: u64,
}

impl<S: CircularStore + ?Sized> SwqReader<S> {
    /// Largest lag at which the slot under the cursor is still intact: the
    /// writer may be filling the slot at `write_pos` right now.
    #[inline]
    fn window(&self) -> u64 {
        self.queue_len - self.slot as u64
    }

    fn poll(&mut self) -> Result<QPos, QueueError> {
        let w = write_pos(&*self.store).load(Ordering::Acquire);
        if self.read_pos > w {
            tracing::warn!(read_pos = self.read_pos, write_pos = w, "writer restarted; resyncing to top");
            self.read_pos = w.saturating_sub(self.slot as u64);
        }
        let avail = w - self.read_pos;
        if avail == 0 {
            return Err(QueueError::Again);
        }
        if avail > self.window() {
            self.overflows += 1;
            return Err(QueueError::Overflow { pos: self.read_pos });
        }
        Ok(self.read_pos)
    }

    /// Copy the next message into `out` and advance. Returns its position.
    ///
    /// # Panics
    /// Panics if `out` is shorter than a message.
    pub fn copy_next(&mut self, out: &mut [u8]) -> Result<QPos, QueueError> {
        let pos = self.poll()?;
        self.store.copy_out(pos, &mut out[..self.slot]);
        // the writer may have lapped us mid-copy
        if self.lapped() {
            self.overflows += 1;
            return Err(QueueError::Overflow { pos });
        }
        self.read_pos = pos + self.slot as u64;
        Ok(pos)
    }

    /// Borrow the next message without copying where possible. The cursor
    /// stays put until [`advance`](Self::advance); check
    /// [`lapped`](Self::lapped) after consuming a borrowed view.
    pub fn next_slice(&mut self) -> Result<&[u8], QueueError> {
        let pos = self.poll()?;
        if self.store.would_cross_boundary(pos, self.slot) {
            self.store.copy_out(pos, &mut self.scratch);
            if self.lapped() {
                self.overflows += 1;
                return Err(QueueError::Overflow { pos });
            }
            return Ok(&self.scratch);
        }
        self.store.span(pos, self.slot).ok_or(QueueError::Malformed { pos })
    }

    #[inline]
    pub fn advance(&mut self) {
        self.read_pos += self.slot as u64;
    }

    /// True if the message under the cursor may have been overwritten.
    #[inline]
    pub fn lapped(&self) -> bool {
        atomic::fence(Ordering::Acquire);
        let w = write_pos(&*self.store).load(Ordering::Acquire);
        w.saturating_sub(self.read_pos) > self.window()
    }

    /// Jump to the single most recent message.
    pub fn seek_to_top(&mut self) {
        let w = write_pos(&*self.store).load(Ordering::Acquire);
        self.read_pos = w.saturating_sub(self.slot as u64);
    }

    /// Skip whole messages until the cursor is inside the safe window.
    /// Returns how many were skipped.
    pub fn catch_up(&mut self) -> u64 {
        let w = write_pos(&*self.store).load(Ordering::Acquire);
        let behind = w.saturating_sub(self.read_pos);
        if behind <= self.window() {
            return 0;
        }
        let skipped = (behind - self.window()).div_ceil(self.slot as u64);
        self.read_pos += skipped * self.slot as u64;
        skipped
    }

    pub fn sync_pos(&mut self, pos: QPos) {
        self.read_pos = pos;
    }

    #[inline]
    pub fn pos(&self) -> QPos {
        self.read_pos
    }

    /// Messages written but not yet read.
    pub fn available(&self) -> u64 {
        let w = write_pos(&*self.store).load(Ordering::Acquire);
        w.saturating_sub(self.read_pos) / self.slot as u64
    }

    #[inline]
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}
