//! Producer-to-consumer hand-off queues.
//!
//! The queue is the only structure shared between producer threads and the
//! consumer; the implementation is pluggable at construction time so the
//! backpressure behavior can be chosen per deployment:
//!
//! - [`UnboundedQueue`]: mutex + condvar FIFO, grows under overload.
//! - [`BoundedQueue`]: fixed-capacity ring, `push` blocks when full.

mod bounded;
mod unbounded;

pub use bounded::BoundedQueue;
pub use unbounded::UnboundedQueue;

use crate::record::WriteRecord;

/// Thread-safe FIFO hand-off between many producers and one consumer.
///
/// Pushes from any single producer thread are observed in program order by
/// the consumer; cross-producer order is whatever the queue's internal
/// serialization point produced, and downstream code must not assume more.
pub trait HandoffQueue: Send + Sync {
    /// Enqueue a record.
    ///
    /// The bounded variant blocks until space exists or the queue is shut
    /// down. After shutdown, push drops the record silently; producers
    /// racing destruction must stay safe, not loud.
    fn push(&self, record: WriteRecord);

    /// Non-blocking pop; `None` iff the queue is currently empty.
    fn try_pop(&self) -> Option<WriteRecord>;

    /// Blocking pop; `None` only when the queue is shut down *and* empty.
    fn pop(&self) -> Option<WriteRecord>;

    /// Set the terminal flag and wake all waiters. Idempotent.
    fn shutdown(&self);

    /// Best-effort snapshot of the element count.
    fn len(&self) -> usize;

    /// Best-effort emptiness snapshot; not usable for synchronization.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
