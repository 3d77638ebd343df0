//! One fixed-size free list of buffers (a single size class).

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::buffer::Buffer;

/// Fixed array of slots, each either holding an idle [`Buffer`] of exactly
/// `slot_capacity` bytes or empty because that buffer is in flight.
#[derive(Debug)]
pub struct SizedPool {
    slots: Mutex<Vec<Option<Buffer>>>,
    slot_capacity: usize,
    // Rotates the probe start so repeated acquire/release cycles do not
    // hammer slot zero.
    hint: AtomicUsize,
}

impl SizedPool {
    /// Pre-warm `slot_count` buffers of `slot_capacity` bytes each.
    #[must_use]
    pub fn new(slot_count: usize, slot_capacity: usize) -> Self {
        let slots = (0..slot_count)
            .map(|_| Some(Buffer::with_capacity(slot_capacity)))
            .collect();
        Self {
            slots: Mutex::new(slots),
            slot_capacity,
            hint: AtomicUsize::new(0),
        }
    }

    /// Capacity of every buffer in this class.
    #[must_use]
    pub const fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    /// Take an idle buffer, cleared to `len == 0`. `None` when exhausted.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Buffer> {
        let mut slots = self.slots.lock();
        let slot_count = slots.len();
        for _ in 0..slot_count {
            let index = self.hint.fetch_add(1, Ordering::Relaxed) % slot_count;
            if let Some(mut buffer) = slots[index].take() {
                buffer.clear();
                return Some(buffer);
            }
        }
        None
    }

    /// Return a buffer to the first empty slot.
    ///
    /// # Errors
    ///
    /// Hands the buffer back when its capacity does not match this class or
    /// when every slot is already occupied; the caller drops it.
    pub fn try_release(&self, buffer: Buffer) -> Result<(), Buffer> {
        if buffer.capacity() != self.slot_capacity {
            return Err(buffer);
        }
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.is_none() {
                *slot = Some(buffer);
                return Ok(());
            }
        }
        Err(buffer)
    }

    /// Idle buffer count (best-effort snapshot).
    #[must_use]
    pub fn available(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Total slot count.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prewarmed_and_exhaustion() {
        let pool = SizedPool::new(2, 64);
        assert_eq!(pool.available(), 2);

        let a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert_eq!(a.capacity(), 64);
        assert_eq!(b.capacity(), 64);
        assert_eq!(pool.available(), 0);
        assert!(pool.try_acquire().is_none());

        pool.try_release(a).unwrap();
        assert_eq!(pool.available(), 1);
        pool.try_release(b).unwrap();
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_release_rejects_foreign_capacity() {
        let pool = SizedPool::new(1, 64);
        let _held = pool.try_acquire().unwrap();
        let foreign = Buffer::with_capacity(128);
        assert!(pool.try_release(foreign).is_err());
    }

    #[test]
    fn test_release_rejects_when_full() {
        let pool = SizedPool::new(1, 64);
        let extra = Buffer::with_capacity(64);
        assert!(pool.try_release(extra).is_err());
    }

    #[test]
    fn test_acquire_clears_previous_fill() {
        let pool = SizedPool::new(1, 64);
        let mut buffer = pool.try_acquire().unwrap();
        buffer.extend_from_slice(b"stale");
        pool.try_release(buffer).unwrap();

        let reused = pool.try_acquire().unwrap();
        assert!(reused.is_empty());
    }
}
