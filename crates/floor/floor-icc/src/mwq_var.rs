//! Multi-writer queue with variable-length messages.
//!
//! Each message is a little-endian `u32` body length followed by the body.
//! The length prefix is written at claim time, so even an abandoned claim
//! leaves a well-formed (zeroed) message behind.

use crate::QPos;
use crate::config::QueueConfig;
use crate::error::{QueueError, WriteError};
use crate::mwq::{Claim, Mwq, Positions};
use crate::store::CircularStore;
use std::sync::Arc;
use std::sync::atomic::Ordering;

const LEN_PREFIX: usize = size_of::<u32>();

pub struct VarQueue<S: CircularStore + ?Sized> {
    mwq: Mwq<S>,
}

impl<S: CircularStore + ?Sized> Clone for VarQueue<S> {
    fn clone(&self) -> Self {
        Self {
            mwq: self.mwq.clone(),
        }
    }
}

impl<S: CircularStore + ?Sized> VarQueue<S> {
    /// `cfg.slot_size` bounds the encoded size of one message, prefix included.
    pub fn new(store: Arc<S>, cfg: QueueConfig) -> Self {
        Self {
            mwq: Mwq::new(store, cfg),
        }
    }

    pub fn writer(&self) -> VarWriter<S> {
        VarWriter {
            mwq: self.mwq.clone(),
        }
    }

    pub fn reader(&self) -> VarReader<S> {
        let ready = self.mwq.ready_pos().load(Ordering::Acquire);
        self.reader_at(ready)
    }

    /// `pos` must be the start of a message (a position returned by `put`).
    pub fn reader_at(&self, pos: QPos) -> VarReader<S> {
        VarReader {
            mwq: self.mwq.clone(),
            read_pos: pos,
            overflows: 0,
        }
    }

    /// Largest body a single message may carry.
    #[inline]
    pub fn max_body(&self) -> usize {
        self.mwq.cfg.slot_size - LEN_PREFIX
    }

    pub fn positions(&self) -> Positions {
        self.mwq.positions()
    }
}

pub struct VarWriter<S: CircularStore + ?Sized> {
    mwq: Mwq<S>,
}

impl<S: CircularStore + ?Sized> VarWriter<S> {
    pub fn put(&self, body: &[u8]) -> Result<QPos, WriteError> {
        let mut claim = self.claim(body.len())?;
        claim.write(0, body);
        Ok(claim.commit())
    }

    /// Reserve space for a body of `len` bytes.
    pub fn claim(&self, len: usize) -> Result<Claim<'_, S>, WriteError> {
        let size = LEN_PREFIX + len;
        if size > self.mwq.cfg.slot_size {
            return Err(WriteError::TooLarge {
                size,
                max: self.mwq.cfg.slot_size,
            });
        }
        let pos = self.mwq.claim(size as u64)?;
        self.mwq.store.copy_in(pos, &(len as u32).to_le_bytes());
        Ok(Claim::new(&self.mwq, pos, LEN_PREFIX, len))
    }
}

pub struct VarReader<S: CircularStore + ?Sized> {
    mwq: Mwq<S>,
    read_pos: QPos,
    overflows: u64,
}

impl<S: CircularStore + ?Sized> VarReader<S> {
    /// Copy the next message body into `out` (replacing its contents) and
    /// advance. Returns the message position.
    pub fn copy_next(&mut self, out: &mut Vec<u8>) -> Result<QPos, QueueError> {
        let w = self.mwq.write_pos().load(Ordering::Acquire);
        if self.read_pos > w {
            tracing::warn!(read_pos = self.read_pos, write_pos = w, "queue restarted; resyncing to top");
            self.advance_to_top();
        }
        let pos = self.read_pos;
        if w.saturating_sub(pos) >= self.mwq.cfg.queue_len {
            return Err(self.overflowed(pos));
        }
        let ready = self.mwq.ready_pos().load(Ordering::Acquire);
        if ready <= pos {
            return Err(QueueError::Again);
        }

        let mut prefix = [0u8; LEN_PREFIX];
        self.mwq.store.copy_out(pos, &mut prefix);
        let len = u32::from_le_bytes(prefix) as usize;
        let end = pos + (LEN_PREFIX + len) as u64;
        if LEN_PREFIX + len > self.mwq.cfg.slot_size || end > ready {
            // a torn prefix means we were lapped, not that the queue is bad
            if self.mwq.lapped(pos) {
                return Err(self.overflowed(pos));
            }
            return Err(QueueError::Malformed { pos });
        }

        out.clear();
        out.resize(len, 0);
        self.mwq.store.copy_out(pos + LEN_PREFIX as u64, out);
        if self.mwq.lapped(pos) {
            return Err(self.overflowed(pos));
        }
        self.read_pos = end;
        Ok(pos)
    }

    fn overflowed(&mut self, pos: QPos) -> QueueError {
        self.overflows += 1;
        QueueError::Overflow { pos }
    }

    /// Jump past everything published so far. Message boundaries are not
    /// recoverable from an arbitrary offset, so this is the only safe resync.
    pub fn advance_to_top(&mut self) {
        self.read_pos = self.mwq.ready_pos().load(Ordering::Acquire);
    }

    /// `pos` must be a message start.
    pub fn sync_pos(&mut self, pos: QPos) {
        self.read_pos = pos;
    }

    #[inline]
    pub fn pos(&self) -> QPos {
        self.read_pos
    }

    #[inline]
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::MWQ_HEADER_LEN;
    use crate::store::HeapStore;
    use std::thread;

    fn queue(len: u64, max: usize) -> VarQueue<HeapStore> {
        VarQueue::new(
            Arc::new(HeapStore::new(MWQ_HEADER_LEN, len)),
            QueueConfig::new(len, max),
        )
    }

    #[test]
    fn mixed_lengths_round_trip() {
        let q = queue(4096, 256);
        let w = q.writer();
        let mut r = q.reader();

        let bodies: Vec<Vec<u8>> = vec![b"".to_vec(), b"a".to_vec(), vec![7u8; 200], b"hello".to_vec()];
        let mut expected_pos = 0;
        for b in &bodies {
            assert_eq!(w.put(b).unwrap(), expected_pos);
            expected_pos += (LEN_PREFIX + b.len()) as u64;
        }

        let mut out = Vec::new();
        for b in &bodies {
            r.copy_next(&mut out).unwrap();
            assert_eq!(&out, b);
        }
        assert_eq!(r.copy_next(&mut out), Err(QueueError::Again));
    }

    #[test]
    fn messages_straddling_the_end_are_reassembled() {
        let q = queue(100, 40);
        let w = q.writer();
        let mut r = q.reader();
        let mut out = Vec::new();

        for i in 0..50u8 {
            let body = vec![i; (i % 30) as usize];
            w.put(&body).unwrap();
            r.copy_next(&mut out).unwrap();
            assert_eq!(out, body);
        }
    }

    #[test]
    fn oversized_message_is_rejected() {
        let q = queue(1024, 64);
        let w = q.writer();
        assert_eq!(
            w.put(&[0u8; 61]),
            Err(WriteError::TooLarge { size: 65, max: 64 })
        );
        assert_eq!(q.positions().write, 0);
        assert_eq!(q.max_body(), 60);
    }

    #[test]
    fn slow_reader_overflows_then_resyncs() {
        let q = queue(256, 64);
        let w = q.writer();
        let mut r = q.reader();
        for _ in 0..20 {
            w.put(&[1u8; 28]).unwrap();
        }
        let mut out = Vec::new();
        assert!(matches!(r.copy_next(&mut out), Err(QueueError::Overflow { pos: 0 })));
        assert_eq!(r.overflows(), 1);

        r.advance_to_top();
        assert_eq!(r.copy_next(&mut out), Err(QueueError::Again));
        w.put(b"fresh").unwrap();
        r.copy_next(&mut out).unwrap();
        assert_eq!(out, b"fresh");
    }

    #[test]
    fn reader_at_a_non_boundary_reports_malformed() {
        let q = queue(1024, 64);
        let w = q.writer();
        w.put(&[0xFF; 40]).unwrap();
        // 0xFFFFFFFF read as a length
        let mut r = q.reader_at(4);
        let mut out = Vec::new();
        assert_eq!(r.copy_next(&mut out), Err(QueueError::Malformed { pos: 4 }));
    }

    #[test]
    fn concurrent_writers_deliver_whole_messages() {
        let q = queue(1 << 20, 128);
        let mut r = q.reader();
        let handles: Vec<_> = (1..=4u8)
            .map(|id| {
                let w = q.writer();
                thread::spawn(move || {
                    for n in 0..1_000usize {
                        w.put(&vec![id; 1 + n % 100]).unwrap();
                    }
                })
            })
            .collect();

        let mut out = Vec::new();
        let mut count = 0;
        while count < 4_000 {
            match r.copy_next(&mut out) {
                Ok(_) => {
                    assert!(!out.is_empty());
                    assert!(out.iter().all(|&b| b == out[0]), "torn message");
                    count += 1;
                }
                Err(QueueError::Again) => thread::yield_now(),
                Err(e) => panic!("unexpected {e}"),
            }
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
