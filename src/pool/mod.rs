//! Size-classed buffer pool feeding the write pipeline.
//!
//! Three pre-warmed classes (small/medium/large) eliminate per-message
//! allocation on the hot path; requests that miss every class fall back to
//! an ad-hoc allocation that is destroyed on release instead of pooled.

mod buffer;
mod sized;

pub use buffer::Buffer;
pub use sized::SizedPool;

/// Slot count and per-buffer capacity for one pool class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassSpec {
    /// Number of pre-warmed buffers.
    pub slots: usize,
    /// Capacity of each buffer in bytes.
    pub capacity: usize,
}

/// Three size-classed free lists plus an oversize fallback.
#[derive(Debug)]
pub struct BufferPool {
    small: SizedPool,
    medium: SizedPool,
    large: SizedPool,
}

impl BufferPool {
    /// Default class geometry: 512 × 1 KiB, 256 × 4 KiB, 128 × 16 KiB.
    pub const DEFAULT_SMALL: ClassSpec = ClassSpec { slots: 512, capacity: 1024 };
    /// Default medium class.
    pub const DEFAULT_MEDIUM: ClassSpec = ClassSpec { slots: 256, capacity: 4096 };
    /// Default large class.
    pub const DEFAULT_LARGE: ClassSpec = ClassSpec { slots: 128, capacity: 16384 };

    /// Pre-warm all three classes.
    #[must_use]
    pub fn new(small: ClassSpec, medium: ClassSpec, large: ClassSpec) -> Self {
        Self {
            small: SizedPool::new(small.slots, small.capacity),
            medium: SizedPool::new(medium.slots, medium.capacity),
            large: SizedPool::new(large.slots, large.capacity),
        }
    }

    /// Take a buffer with `capacity >= required` from the smallest class
    /// that fits. When the chosen class is exhausted, or `required` exceeds
    /// every class, an ad-hoc buffer of exactly `required` bytes is
    /// allocated instead (and destroyed on release).
    #[must_use]
    pub fn acquire(&self, required: usize) -> Buffer {
        let pooled = if required <= self.small.slot_capacity() {
            self.small.try_acquire()
        } else if required <= self.medium.slot_capacity() {
            self.medium.try_acquire()
        } else if required <= self.large.slot_capacity() {
            self.large.try_acquire()
        } else {
            None
        };
        pooled.unwrap_or_else(|| Buffer::with_capacity(required))
    }

    /// Return a buffer to its class; oversize or surplus buffers are
    /// simply dropped.
    pub fn release(&self, buffer: Buffer) {
        let result = if buffer.capacity() == self.small.slot_capacity() {
            self.small.try_release(buffer)
        } else if buffer.capacity() == self.medium.slot_capacity() {
            self.medium.try_release(buffer)
        } else if buffer.capacity() == self.large.slot_capacity() {
            self.large.try_release(buffer)
        } else {
            Err(buffer)
        };
        drop(result);
    }

    /// Snapshot of pool occupancy.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.small.slot_count() + self.medium.slot_count() + self.large.slot_count(),
            available: self.small.available() + self.medium.available() + self.large.available(),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SMALL, Self::DEFAULT_MEDIUM, Self::DEFAULT_LARGE)
    }
}

/// Occupancy snapshot across all classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total pooled slots.
    pub total: usize,
    /// Slots currently holding an idle buffer.
    pub available: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufferPool({} available/{} total)", self.available, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_pool() -> BufferPool {
        BufferPool::new(
            ClassSpec { slots: 2, capacity: 64 },
            ClassSpec { slots: 2, capacity: 256 },
            ClassSpec { slots: 1, capacity: 1024 },
        )
    }

    #[test]
    fn test_smallest_fitting_class() {
        let pool = tiny_pool();
        assert_eq!(pool.acquire(10).capacity(), 64);
        assert_eq!(pool.acquire(64).capacity(), 64);
        assert_eq!(pool.acquire(65).capacity(), 256);
        assert_eq!(pool.acquire(1000).capacity(), 1024);
    }

    #[test]
    fn test_exhausted_class_allocates_exact() {
        let pool = tiny_pool();
        let a = pool.acquire(10);
        let b = pool.acquire(10);
        // Small class empty: the fallback is sized exactly, not pooled.
        let c = pool.acquire(10);
        assert_eq!(c.capacity(), 10);

        let stats = pool.stats();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.available, 3);

        pool.release(a);
        pool.release(b);
        pool.release(c);
        // The exact-sized fallback was destroyed, not adopted.
        assert_eq!(pool.stats().available, 5);
    }

    #[test]
    fn test_oversize_request_never_pooled() {
        let pool = tiny_pool();
        let big = pool.acquire(4096);
        assert_eq!(big.capacity(), 4096);
        pool.release(big);
        assert_eq!(pool.stats().available, 5);
    }

    #[test]
    fn test_acquired_buffers_start_empty() {
        let pool = tiny_pool();
        let mut buffer = pool.acquire(32);
        buffer.extend_from_slice(b"residue");
        pool.release(buffer);
        assert!(pool.acquire(32).is_empty());
    }

    #[test]
    fn test_stats_display() {
        let pool = tiny_pool();
        assert_eq!(pool.stats().to_string(), "BufferPool(5 available/5 total)");
    }
}
