//! Growable byte buffers for the cipher pipeline.
//!
//! A [`ByteBuffer`] carries plaintext or ciphertext between the socket layer
//! and the cipher operations. It differs from a bare `Vec<u8>` in three ways:
//!
//! - Capacity is explicit and exact: `with_capacity(n)` owns exactly `n`
//!   addressable bytes, and [`ByteBuffer::spare_mut`] exposes the unused tail
//!   so a reader can fill it directly.
//! - Capacity never shrinks for the life of the instance. Only
//!   [`ByteBuffer::release`] gives storage back.
//! - Storage is zeroized before it is freed, including the old block left
//!   behind when the buffer grows.
//!
//! # Allocation Failure
//!
//! Growth goes through the global allocator, which aborts the process on
//! exhaustion. There is no recoverable allocation path at this layer.

use std::fmt;
use zeroize::Zeroize;

/// Owned, growable byte storage with monotonic capacity.
///
/// Invariant: `len() <= capacity()`.
#[derive(Default)]
pub struct ByteBuffer {
    /// Read/write cursor for callers that consume the buffer incrementally
    idx: usize,
    /// Number of valid bytes at the front of `data`
    len: usize,
    /// Backing storage; `data.len()` is the capacity
    data: Vec<u8>,
}

impl ByteBuffer {
    /// Create an empty buffer with no storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer owning exactly `capacity` bytes of storage.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Self::new();
        buf.allocate(capacity);
        buf
    }

    /// Reset bookkeeping and allocate exactly `capacity` bytes.
    ///
    /// Any previous contents are zeroized and dropped. Returns the capacity
    /// achieved, which always equals `capacity`.
    pub fn allocate(&mut self, capacity: usize) -> usize {
        self.data.zeroize();
        self.idx = 0;
        self.len = 0;
        self.data = vec![0u8; capacity];
        capacity
    }

    /// Grow storage to at least `max(min_len, min_capacity)` bytes.
    ///
    /// Never shrinks. Returns the capacity after the call, which is
    /// unchanged if the buffer was already large enough.
    pub fn ensure_capacity(&mut self, min_len: usize, min_capacity: usize) -> usize {
        let required = min_len.max(min_capacity);
        if self.data.len() < required {
            drop(self.regrow(required));
        }
        self.data.len()
    }

    /// Move storage into a fresh block of `capacity` bytes.
    ///
    /// Returns the retired block, already wiped, for the caller to free.
    fn regrow(&mut self, capacity: usize) -> Vec<u8> {
        let mut grown = vec![0u8; capacity];
        grown[..self.data.len()].copy_from_slice(&self.data);

        let mut retired = std::mem::replace(&mut self.data, grown);
        retired.as_mut_slice().zeroize();
        retired
    }

    /// Insert the contents of `other` in front of this buffer's contents.
    ///
    /// Grows to hold `len() + other.len()` bytes (and at least `capacity`),
    /// shifts the existing bytes right with an overlap-safe move, then copies
    /// `other` into the freed prefix. `other` is left untouched. Returns the
    /// new length.
    pub fn prepend_from(&mut self, other: &ByteBuffer, capacity: usize) -> usize {
        let moved = self.len;
        let inserted = other.len;

        self.ensure_capacity(moved + inserted, capacity);
        self.data.copy_within(0..moved, inserted);
        self.data[..inserted].copy_from_slice(other.as_slice());
        self.len = moved + inserted;
        self.len
    }

    /// Zeroize and free storage, resetting length, capacity and cursor.
    ///
    /// Safe to call any number of times.
    pub fn release(&mut self) {
        self.data.zeroize();
        self.data = Vec::new();
        self.idx = 0;
        self.len = 0;
    }

    /// Number of valid bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no valid bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of storage owned.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current cursor position.
    #[must_use]
    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Move the cursor.
    ///
    /// # Panics
    ///
    /// Panics if `idx > len()`.
    pub fn set_idx(&mut self, idx: usize) {
        assert!(idx <= self.len, "cursor {idx} past length {}", self.len);
        self.idx = idx;
    }

    /// Set the number of valid bytes, typically after filling [`Self::spare_mut`].
    ///
    /// # Panics
    ///
    /// Panics if `len > capacity()`.
    pub fn set_len(&mut self, len: usize) {
        assert!(
            len <= self.data.len(),
            "length {len} exceeds capacity {}",
            self.data.len()
        );
        self.len = len;
        self.idx = self.idx.min(len);
    }

    /// Valid bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Valid bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }

    /// Unused storage between `len()` and `capacity()`.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Append bytes, growing as needed.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let end = self.len + bytes.len();
        self.ensure_capacity(end, 0);
        self.data[self.len..end].copy_from_slice(bytes);
        self.len = end;
    }

    /// Replace the contents with `bytes`, growing as needed.
    pub fn assign(&mut self, bytes: &[u8]) {
        self.ensure_capacity(bytes.len(), 0);
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        self.idx = 0;
    }

    /// Drop the first `n` valid bytes, moving the rest to the front.
    ///
    /// # Panics
    ///
    /// Panics if `n > len()`.
    pub fn drain_front(&mut self, n: usize) {
        assert!(n <= self.len, "drain of {n} exceeds length {}", self.len);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
        self.idx = self.idx.saturating_sub(n);
    }

    /// Shorten to `len` valid bytes. No effect if already shorter.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
            self.idx = self.idx.min(len);
        }
    }

    /// Discard contents, keeping storage.
    pub fn clear(&mut self) {
        self.len = 0;
        self.idx = 0;
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        let mut buf = Self::with_capacity(bytes.len());
        buf.extend_from_slice(bytes);
        buf
    }
}

impl Drop for ByteBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl fmt::Debug for ByteBuffer {
    // Contents are deliberately omitted; buffers carry plaintext.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("idx", &self.idx)
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_exact_capacity() {
        let mut buf = ByteBuffer::new();
        assert_eq!(buf.allocate(16), 16);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.idx(), 0);
    }

    #[test]
    fn test_ensure_capacity_never_shrinks() {
        let mut buf = ByteBuffer::with_capacity(16);

        assert_eq!(buf.ensure_capacity(0, 8), 16);
        assert_eq!(buf.capacity(), 16);

        assert_eq!(buf.ensure_capacity(0, 32), 32);
        assert_eq!(buf.capacity(), 32);

        // min_len wins when larger
        assert_eq!(buf.ensure_capacity(48, 40), 48);
        assert_eq!(buf.ensure_capacity(1, 1), 48);
    }

    #[test]
    fn test_ensure_capacity_preserves_contents() {
        let mut buf = ByteBuffer::from(&b"tunnel"[..]);
        buf.ensure_capacity(0, 4096);
        assert_eq!(buf.as_slice(), b"tunnel");
    }

    #[test]
    fn test_growth_wipes_retired_storage() {
        let mut buf = ByteBuffer::from(&b"plaintext"[..]);

        let retired = buf.regrow(64);

        assert_eq!(retired.len(), 9);
        assert!(retired.iter().all(|&b| b == 0));
        assert_eq!(buf.as_slice(), b"plaintext");
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn test_growth_keeps_spare_bytes() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.spare_mut().copy_from_slice(b"wxyz");

        buf.extend_from_slice(b"0123456789");
        assert_eq!(buf.as_slice(), b"0123456789");
        assert_eq!(buf.capacity(), 10);

        let mut buf = ByteBuffer::with_capacity(4);
        buf.spare_mut().copy_from_slice(b"wxyz");
        buf.ensure_capacity(0, 8);
        buf.set_len(4);
        assert_eq!(buf.as_slice(), b"wxyz");
    }

    #[test]
    fn test_prepend_from() {
        let mut a = ByteBuffer::from(&b"payload"[..]);
        let b = ByteBuffer::from(&b"SALT"[..]);

        let len = a.prepend_from(&b, 0);

        assert_eq!(len, 11);
        assert_eq!(a.as_slice(), b"SALTpayload");
        assert_eq!(b.as_slice(), b"SALT");
    }

    #[test]
    fn test_prepend_at_full_capacity() {
        // len == capacity going in: growth must cover both parts exactly
        let mut a = ByteBuffer::with_capacity(4);
        a.extend_from_slice(b"abcd");
        assert_eq!(a.len(), a.capacity());

        let b = ByteBuffer::from(&b"xy"[..]);
        a.prepend_from(&b, 0);

        assert_eq!(a.as_slice(), b"xyabcd");
        assert!(a.capacity() >= 6);
    }

    #[test]
    fn test_prepend_longer_than_existing() {
        // Source and destination ranges of the shift overlap only when the
        // prefix is shorter than the existing data; cover both shapes.
        let mut a = ByteBuffer::from(&b"z"[..]);
        let b = ByteBuffer::from(&b"0123456789"[..]);
        a.prepend_from(&b, 0);
        assert_eq!(a.as_slice(), b"0123456789z");

        let mut c = ByteBuffer::from(&b"0123456789"[..]);
        let d = ByteBuffer::from(&b"z"[..]);
        c.prepend_from(&d, 0);
        assert_eq!(c.as_slice(), b"z0123456789");
    }

    #[test]
    fn test_prepend_empty() {
        let mut a = ByteBuffer::from(&b"data"[..]);
        a.prepend_from(&ByteBuffer::new(), 64);
        assert_eq!(a.as_slice(), b"data");
        assert_eq!(a.capacity(), 64);

        let mut empty = ByteBuffer::new();
        empty.prepend_from(&ByteBuffer::from(&b"hdr"[..]), 0);
        assert_eq!(empty.as_slice(), b"hdr");
    }

    #[test]
    fn test_release_idempotent() {
        let mut buf = ByteBuffer::from(&b"secret"[..]);

        buf.release();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 0);

        buf.release();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 0);

        let mut fresh = ByteBuffer::default();
        fresh.release();
        assert_eq!(fresh.capacity(), 0);
    }

    #[test]
    fn test_spare_and_set_len() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.spare_mut()[..3].copy_from_slice(b"abc");
        buf.set_len(3);
        assert_eq!(buf.as_slice(), b"abc");
        assert_eq!(buf.spare_mut().len(), 5);
    }

    #[test]
    #[should_panic(expected = "exceeds capacity")]
    fn test_set_len_past_capacity_panics() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.set_len(5);
    }

    #[test]
    fn test_drain_front() {
        let mut buf = ByteBuffer::from(&b"headerbody"[..]);
        buf.set_idx(8);
        buf.drain_front(6);
        assert_eq!(buf.as_slice(), b"body");
        assert_eq!(buf.idx(), 2);
        assert_eq!(buf.capacity(), 10);
    }

    #[test]
    fn test_assign_keeps_capacity() {
        let mut buf = ByteBuffer::with_capacity(32);
        buf.assign(b"short");
        assert_eq!(buf.as_slice(), b"short");
        assert_eq!(buf.capacity(), 32);

        buf.assign(&[7u8; 40]);
        assert_eq!(buf.len(), 40);
        assert_eq!(buf.capacity(), 40);
    }

    #[test]
    fn test_debug_hides_contents() {
        let buf = ByteBuffer::from(&b"password"[..]);
        let shown = format!("{buf:?}");
        assert!(!shown.contains("password"));
        assert!(shown.contains("len: 8"));
    }
}
