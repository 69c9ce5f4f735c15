//! Byte FIFO used to stage inbound and outbound audio

use std::collections::VecDeque;

/// Minimal FIFO interface the engine needs from its staging buffers.
///
/// Reads are all-or-nothing: a read never returns a short frame.
pub trait ByteFifo {
    /// Append bytes at the tail
    fn push(&mut self, data: &[u8]);
    /// Number of buffered bytes
    fn available(&self) -> usize;
    /// Fill `out` from the head. Returns false and leaves the FIFO untouched
    /// when fewer than `out.len()` bytes are buffered.
    fn read_exact(&mut self, out: &mut [u8]) -> bool;
    /// Drop up to `len` bytes from the head, returning how many were dropped
    fn skip(&mut self, len: usize) -> usize;
    /// Drop everything
    fn clear(&mut self);
}

/// Growable byte FIFO backed by a ring buffer
#[derive(Debug, Clone, Default)]
pub struct ByteQueue {
    inner: VecDeque<u8>,
}

impl ByteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: VecDeque::with_capacity(capacity),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl ByteFifo for ByteQueue {
    fn push(&mut self, data: &[u8]) {
        self.inner.extend(data.iter().copied());
    }

    fn available(&self) -> usize {
        self.inner.len()
    }

    fn read_exact(&mut self, out: &mut [u8]) -> bool {
        let len = out.len();
        if self.inner.len() < len {
            return false;
        }
        for (dst, src) in out.iter_mut().zip(self.inner.drain(..len)) {
            *dst = src;
        }
        true
    }

    fn skip(&mut self, len: usize) -> usize {
        let len = len.min(self.inner.len());
        self.inner.drain(..len);
        len
    }

    fn clear(&mut self) {
        self.inner.clear();
    }
}
