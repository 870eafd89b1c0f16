//! Reusable buffer for uncompressed header blocks

use tracing::error;

/// Byte buffer reused by every encode and decode on a thread.
///
/// The backing storage is kept initialized up to its capacity so that the
/// unfilled tail can be handed to zlib as an output slice. Contents are only
/// meaningful for the duration of one encode or decode call.
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    buf: Vec<u8>,
    len: usize,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: vec![0; capacity], len: 0 }
    }

    /// Empty the buffer, reallocating if it cannot hold `capacity` bytes.
    pub fn prepare(&mut self, capacity: usize) {
        if capacity > self.buf.len() {
            self.buf = vec![0; capacity];
        }
        self.len = 0;
    }

    /// Make sure at least `capacity` bytes are available in total.
    pub fn reserve_total(&mut self, capacity: usize) {
        if capacity > self.buf.len() {
            self.buf.resize(capacity, 0);
        }
    }

    /// Double the capacity, keeping the filled bytes.
    pub(crate) fn grow(&mut self) {
        let capacity = self.buf.len().max(1) * 2;
        error!("Doubling capacity of header scratch buffer to {}", capacity);
        self.buf.resize(capacity, 0);
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Filled bytes.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Unfilled tail, to be followed by [`ScratchBuffer::commit`].
    pub(crate) fn tail_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    pub(crate) fn commit(&mut self, n: usize) {
        assert!(n <= self.tailroom(), "commit past scratch capacity");
        self.len += n;
    }

    /// Whole backing storage, for serializers that track their own offset.
    pub(crate) fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_clears_and_sizes() {
        let mut scratch = ScratchBuffer::new();
        scratch.prepare(16);
        assert_eq!(scratch.capacity(), 16);
        scratch.tail_mut()[..3].copy_from_slice(b"abc");
        scratch.commit(3);
        assert_eq!(scratch.filled(), b"abc");

        scratch.prepare(8);
        assert!(scratch.is_empty());
        assert_eq!(scratch.capacity(), 16);
    }

    #[test]
    fn test_grow_keeps_contents() {
        let mut scratch = ScratchBuffer::with_capacity(4);
        scratch.tail_mut().copy_from_slice(b"wxyz");
        scratch.commit(4);
        assert_eq!(scratch.tailroom(), 0);

        scratch.grow();
        assert_eq!(scratch.capacity(), 8);
        assert_eq!(scratch.filled(), b"wxyz");
        assert_eq!(scratch.tailroom(), 4);
    }

    #[test]
    #[should_panic]
    fn test_commit_past_capacity_panics() {
        let mut scratch = ScratchBuffer::with_capacity(2);
        scratch.commit(3);
    }
}
