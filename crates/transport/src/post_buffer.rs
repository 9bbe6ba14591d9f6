//! The buffered outbound post-back with size-threshold auto-flush (spec
//! §4.I).
//!
//! Single-writer (the interpreter thread), single-flusher, synchronous
//! flush on the same thread — there is no internal locking here because
//! nothing else is allowed to touch it concurrently (spec §5).

use crate::error::TransportResult;
use crate::wire::PostPiece;

/// Context wires this to `ReplayService::send_posts` (spec §4.L); tests
/// wire it to a `Vec` to inspect what was flushed.
pub type FlushFn<'a> = dyn FnMut(Vec<PostPiece>) -> TransportResult<()> + 'a;

pub struct PostBuffer<'a> {
    capacity: usize,
    pending: Vec<PostPiece>,
    pending_bytes: usize,
    next_seq: u64,
    session_total_bytes: u64,
    flush_fn: Box<FlushFn<'a>>,
}

impl<'a> PostBuffer<'a> {
    pub fn new(capacity: usize, flush_fn: impl FnMut(Vec<PostPiece>) -> TransportResult<()> + 'a) -> Self {
        Self {
            capacity,
            pending: Vec::new(),
            pending_bytes: 0,
            next_seq: 0,
            session_total_bytes: 0,
            flush_fn: Box::new(flush_fn),
        }
    }

    pub fn session_total_bytes(&self) -> u64 {
        self.session_total_bytes
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Enqueues `bytes`. A lone entry larger than half the capacity
    /// bypasses buffering entirely and is flushed as its own single-entry
    /// batch; otherwise it is appended, flushing first if it would not fit.
    pub fn push(&mut self, bytes: &[u8]) -> TransportResult<()> {
        self.session_total_bytes += bytes.len() as u64;

        if self.pending.is_empty() && bytes.len() > self.capacity / 2 {
            let seq = self.take_seq();
            (self.flush_fn)(vec![PostPiece { id: seq, bytes: bytes.to_vec() }])?;
            return Ok(());
        }

        if self.pending_bytes + bytes.len() > self.capacity {
            self.flush()?;
        }

        let seq = self.take_seq();
        self.pending.push(PostPiece { id: seq, bytes: bytes.to_vec() });
        self.pending_bytes += bytes.len();
        Ok(())
    }

    /// Flushes any buffered entries through the flush callback.
    pub fn flush(&mut self) -> TransportResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        self.pending_bytes = 0;
        (self.flush_fn)(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording() -> (Rc<RefCell<Vec<Vec<PostPiece>>>>, impl FnMut(Vec<PostPiece>) -> TransportResult<()>) {
        let flushes = Rc::new(RefCell::new(Vec::new()));
        let captured = flushes.clone();
        let flush_fn = move |batch: Vec<PostPiece>| {
            captured.borrow_mut().push(batch);
            Ok(())
        };
        (flushes, flush_fn)
    }

    #[test]
    fn small_pushes_batch_until_flush() {
        let (flushes, flush_fn) = recording();
        let mut buf = PostBuffer::new(16, flush_fn);
        buf.push(&[1, 2]).unwrap();
        buf.push(&[3, 4]).unwrap();
        assert!(flushes.borrow().is_empty());
        buf.flush().unwrap();
        assert_eq!(flushes.borrow().len(), 1);
        assert_eq!(flushes.borrow()[0].len(), 2);
    }

    #[test]
    fn oversized_first_push_flushes_immediately() {
        let (flushes, flush_fn) = recording();
        let mut buf = PostBuffer::new(8, flush_fn);
        buf.push(&[0u8; 5]).unwrap(); // > capacity/2 == 4
        assert_eq!(flushes.borrow().len(), 1);
        assert_eq!(buf.pending_bytes(), 0);
    }

    #[test]
    fn push_exceeding_capacity_flushes_then_appends() {
        let (flushes, flush_fn) = recording();
        let mut buf = PostBuffer::new(8, flush_fn);
        buf.push(&[0u8; 3]).unwrap();
        buf.push(&[0u8; 3]).unwrap();
        // Third push would make 9 > 8, so it flushes the first two first.
        buf.push(&[0u8; 3]).unwrap();
        assert_eq!(flushes.borrow().len(), 1);
        assert_eq!(flushes.borrow()[0].len(), 2);
        assert_eq!(buf.pending_bytes(), 3);
    }

    #[test]
    fn sequence_numbers_are_monotonic_across_flushes() {
        let (flushes, flush_fn) = recording();
        let mut buf = PostBuffer::new(4, flush_fn);
        buf.push(&[1]).unwrap();
        buf.flush().unwrap();
        buf.push(&[2]).unwrap();
        buf.flush().unwrap();
        let seqs: Vec<u64> = flushes.borrow().iter().flatten().map(|p| p.id).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn session_total_survives_flushes() {
        let (_flushes, flush_fn) = recording();
        let mut buf = PostBuffer::new(4, flush_fn);
        buf.push(&[1, 2]).unwrap();
        buf.flush().unwrap();
        buf.push(&[3, 4]).unwrap();
        assert_eq!(buf.session_total_bytes(), 4);
    }
}
