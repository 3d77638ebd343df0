//! Log records as they travel from producers to the consumer.

use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;

/// Message severity. All severities share one destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational message.
    Info,
    /// Something unexpected but recoverable.
    Warn,
    /// An error the application should know about.
    Error,
}

impl Severity {
    /// Uppercase level tag used in the on-disk line format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static NEXT_PRODUCER_TAG: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static PRODUCER_TAG: u64 = NEXT_PRODUCER_TAG.fetch_add(1, Ordering::Relaxed);
}

/// Opaque identifier of the calling thread, assigned on first use.
#[must_use]
pub fn current_producer_tag() -> u64 {
    PRODUCER_TAG.with(|tag| *tag)
}

/// One log message in flight between a producer and the consumer.
///
/// Immutable after enqueue; dies when the preparer copies it into a buffer.
#[derive(Debug)]
pub struct WriteRecord {
    /// Message severity.
    pub severity: Severity,
    /// Already-formatted user message body.
    pub payload: String,
    /// Opaque identifier of the originating thread.
    pub producer_tag: u64,
    /// Wall-clock instant captured at submission.
    pub timestamp: OffsetDateTime,
    /// Monotonic enqueue counter, assigned by the queue under its push
    /// critical section. Zero until enqueued.
    #[cfg(feature = "seq-track")]
    pub sequence: u64,
}

impl WriteRecord {
    /// Build a record for the current thread, stamping tag and timestamp.
    #[must_use]
    pub fn new(severity: Severity, payload: String) -> Self {
        Self {
            severity,
            payload,
            producer_tag: current_producer_tag(),
            timestamp: OffsetDateTime::now_utc(),
            #[cfg(feature = "seq-track")]
            sequence: 0,
        }
    }
}

/// Injected monotonic counter backing sequence-tag mode.
///
/// Shared (cloned) between queues so a whole process observes one enqueue
/// order; tests construct a fresh source to reset deterministically.
#[cfg(feature = "seq-track")]
#[derive(Debug, Clone, Default)]
pub struct SequenceSource {
    counter: std::sync::Arc<AtomicU64>,
}

#[cfg(feature = "seq-track")]
impl SequenceSource {
    /// New counter starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next sequence value.
    ///
    /// Callers must invoke this inside the queue's push critical section so
    /// sequence values reflect true enqueue order.
    #[must_use]
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of sequence values handed out so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Reset to zero (tests only; not safe under concurrent `next`).
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_tags() {
        assert_eq!(Severity::Info.as_str(), "INFO");
        assert_eq!(Severity::Warn.as_str(), "WARN");
        assert_eq!(Severity::Error.as_str(), "ERROR");
    }

    #[test]
    fn test_producer_tag_stable_per_thread() {
        let a = current_producer_tag();
        let b = current_producer_tag();
        assert_eq!(a, b);

        let other = std::thread::spawn(current_producer_tag).join().unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_record_stamps_metadata() {
        let record = WriteRecord::new(Severity::Warn, "hello".to_string());
        assert_eq!(record.severity, Severity::Warn);
        assert_eq!(record.payload, "hello");
        assert_eq!(record.producer_tag, current_producer_tag());
    }

    #[cfg(feature = "seq-track")]
    #[test]
    fn test_sequence_source_monotonic() {
        let source = SequenceSource::new();
        assert_eq!(source.next(), 1);
        assert_eq!(source.next(), 2);
        assert_eq!(source.issued(), 2);
        source.reset();
        assert_eq!(source.next(), 1);
    }
}
