//! Bounded blocking ring: fixed-capacity circular buffer with separate
//! not-full / not-empty condvars. Full queue = producer backpressure.

use parking_lot::{Condvar, Mutex};

use super::HandoffQueue;
use crate::record::WriteRecord;

#[cfg(feature = "seq-track")]
use crate::record::SequenceSource;

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<WriteRecord>>,
    head: usize,
    tail: usize,
    count: usize,
    stopped: bool,
    #[cfg(feature = "seq-track")]
    sequence: SequenceSource,
}

impl Ring {
    fn push(&mut self, record: WriteRecord) {
        debug_assert!(self.count < self.slots.len());
        self.slots[self.tail] = Some(record);
        self.tail = (self.tail + 1) % self.slots.len();
        self.count += 1;
    }

    fn pop(&mut self) -> Option<WriteRecord> {
        if self.count == 0 {
            return None;
        }
        let record = self.slots[self.head].take();
        debug_assert!(record.is_some());
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        record
    }
}

/// Fixed-capacity MPSC/MPMC queue. `push` blocks while full, `pop` blocks
/// while empty; both wake on shutdown.
#[derive(Debug)]
pub struct BoundedQueue {
    inner: Mutex<Ring>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl BoundedQueue {
    /// New queue holding at most `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded queue capacity must be positive");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                count: 0,
                stopped: false,
                #[cfg(feature = "seq-track")]
                sequence: SequenceSource::new(),
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// New queue drawing sequence tags from `source`.
    #[cfg(feature = "seq-track")]
    #[must_use]
    pub fn with_sequence_source(capacity: usize, source: SequenceSource) -> Self {
        let queue = Self::new(capacity);
        queue.inner.lock().sequence = source;
        queue
    }

    /// Maximum number of queued records.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().slots.len()
    }
}

impl HandoffQueue for BoundedQueue {
    #[allow(unused_mut)]
    fn push(&self, mut record: WriteRecord) {
        {
            let mut inner = self.inner.lock();
            self.not_full
                .wait_while(&mut inner, |ring| ring.count == ring.slots.len() && !ring.stopped);
            if inner.stopped {
                return;
            }
            #[cfg(feature = "seq-track")]
            {
                record.sequence = inner.sequence.next();
            }
            inner.push(record);
        }
        self.not_empty.notify_one();
    }

    fn try_pop(&self) -> Option<WriteRecord> {
        let record = self.inner.lock().pop();
        if record.is_some() {
            self.not_full.notify_one();
        }
        record
    }

    fn pop(&self) -> Option<WriteRecord> {
        let record = {
            let mut inner = self.inner.lock();
            self.not_empty
                .wait_while(&mut inner, |ring| ring.count == 0 && !ring.stopped);
            inner.pop()
        };
        if record.is_some() {
            self.not_full.notify_one();
        }
        record
    }

    fn shutdown(&self) {
        {
            let mut inner = self.inner.lock();
            inner.stopped = true;
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    fn len(&self) -> usize {
        self.inner.lock().count
    }
}
