//! Uniquely-owned, fixed-capacity byte buffers.

/// Owned heap-backed byte region with a fill level.
///
/// Capacity never changes after construction and ownership is unique for
/// the buffer's whole life: a buffer is either idle in a pool slot
/// (`len == 0`) or in flight inside a write task, never both.
#[derive(Debug)]
pub struct Buffer {
    data: Box<[u8]>,
    len: usize,
}

impl Buffer {
    /// Allocate a zeroed buffer of exactly `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Fixed capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes currently filled.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when no bytes are filled.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reset the fill level; capacity and backing storage are untouched.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Filled prefix of the region.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Pointer to the start of the region. Stable across moves of the
    /// `Buffer` value (the storage is heap-allocated), which is what lets
    /// an in-flight kernel write reference it while the owning task moves.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// The whole writable region, independent of the fill level.
    pub fn region_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Set the fill level after writing through [`Self::region_mut`].
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.data.len(), "fill level beyond buffer capacity");
        self.len = len;
    }

    /// Append `src`, growing the fill level.
    ///
    /// # Panics
    ///
    /// Panics if the bytes do not fit the remaining capacity.
    pub fn extend_from_slice(&mut self, src: &[u8]) {
        let end = self.len + src.len();
        assert!(end <= self.data.len(), "append beyond buffer capacity");
        self.data[self.len..end].copy_from_slice(src);
        self.len = end;
    }
}
