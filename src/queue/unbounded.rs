//! Unbounded guarded FIFO: a mutex-protected deque plus one condvar.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::HandoffQueue;
use crate::record::WriteRecord;

#[cfg(feature = "seq-track")]
use crate::record::SequenceSource;

#[derive(Debug)]
struct Inner {
    queue: VecDeque<WriteRecord>,
    stopped: bool,
    #[cfg(feature = "seq-track")]
    sequence: SequenceSource,
}

/// Unbounded MPSC/MPMC queue. Memory grows under sustained overload;
/// choose [`super::BoundedQueue`] when producers should block instead.
#[derive(Debug)]
pub struct UnboundedQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl UnboundedQueue {
    /// New empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                stopped: false,
                #[cfg(feature = "seq-track")]
                sequence: SequenceSource::new(),
            }),
            not_empty: Condvar::new(),
        }
    }

    /// New queue drawing sequence tags from `source`.
    #[cfg(feature = "seq-track")]
    #[must_use]
    pub fn with_sequence_source(source: SequenceSource) -> Self {
        let queue = Self::new();
        queue.inner.lock().sequence = source;
        queue
    }
}

impl Default for UnboundedQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffQueue for UnboundedQueue {
    #[allow(unused_mut)]
    fn push(&self, mut record: WriteRecord) {
        {
            let mut inner = self.inner.lock();
            if inner.stopped {
                return;
            }
            // Assigned under the same critical section that inserts, so the
            // tag order is the true enqueue order.
            #[cfg(feature = "seq-track")]
            {
                record.sequence = inner.sequence.next();
            }
            inner.queue.push_back(record);
        }
        self.not_empty.notify_one();
    }

    fn try_pop(&self) -> Option<WriteRecord> {
        self.inner.lock().queue.pop_front()
    }

    fn pop(&self) -> Option<WriteRecord> {
        let mut inner = self.inner.lock();
        self.not_empty
            .wait_while(&mut inner, |inner| inner.queue.is_empty() && !inner.stopped);
        inner.queue.pop_front()
    }

    fn shutdown(&self) {
        {
            let mut inner = self.inner.lock();
            inner.stopped = true;
        }
        self.not_empty.notify_all();
    }

    fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }
}
