//! Resumable bookkeeping for one outstanding asynchronous write.

use std::os::unix::io::RawFd;

use crate::pool::Buffer;
use crate::ring::IoRing;

/// Progress of a write task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, submission not yet attempted.
    Initial,
    /// Entry handed to the ring; parked until its completion is reaped.
    Suspended,
    /// Finished with the kernel result (bytes written or negative errno).
    Done(i32),
}

/// One outstanding write: owns its payload buffer for the whole flight so
/// the raw pointer inside the ring entry stays valid, and records the
/// kernel result when the consumer resumes it.
///
/// The life of a task is `Initial → Suspended → Done`, except that a
/// failed submission resolves it synchronously (`Initial → Done` with a
/// captured error).
#[derive(Debug)]
pub struct WriteTask {
    token: u64,
    buffer: Buffer,
    record_count: usize,
    state: TaskState,
}

impl WriteTask {
    /// New task owning `buffer`, identified by `token` in completions.
    /// `record_count` is how many log records the payload carries (more
    /// than one for a coalesced write); the consumer releases that many
    /// units of outstanding work when the task retires.
    #[must_use]
    pub fn new(token: u64, buffer: Buffer, record_count: usize) -> Self {
        Self {
            token,
            buffer,
            record_count,
            state: TaskState::Initial,
        }
    }

    /// Completion token unique among outstanding writes.
    #[must_use]
    pub const fn token(&self) -> u64 {
        self.token
    }

    /// Log records carried by this write.
    #[must_use]
    pub const fn record_count(&self) -> usize {
        self.record_count
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Bytes this task will write.
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        self.buffer.len()
    }

    /// Attempt submission: prepare the ring entry referencing the owned
    /// buffer. A momentarily full submission queue is flushed once and
    /// retried; if it is still full, or the ring is unusable, the task
    /// resolves synchronously with a captured error instead of suspending.
    ///
    /// Returns `true` when the task is parked awaiting a completion.
    pub fn start(&mut self, ring: &mut IoRing, fd: RawFd) -> bool {
        debug_assert_eq!(self.state, TaskState::Initial);

        let mut attempt = ring.prepare_write(fd, &self.buffer, self.token);
        if matches!(attempt, Err(crate::error::RingError::SubmissionQueueFull)) && ring.submit_pending() {
            attempt = ring.prepare_write(fd, &self.buffer, self.token);
        }

        match attempt {
            Ok(()) => {
                self.state = TaskState::Suspended;
                true
            }
            Err(crate::error::RingError::SubmissionQueueFull) => {
                self.state = TaskState::Done(-libc::EBUSY);
                false
            }
            Err(_) => {
                self.state = TaskState::Done(-libc::EIO);
                false
            }
        }
    }

    /// Resume with the kernel-reported result; the task advances to done.
    pub fn resume(&mut self, result: i32) {
        debug_assert_eq!(self.state, TaskState::Suspended);
        self.state = TaskState::Done(result);
    }

    /// True once the result is recorded.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.state, TaskState::Done(_))
    }

    /// The recorded result, if done.
    #[must_use]
    pub const fn result(&self) -> Option<i32> {
        match self.state {
            TaskState::Done(result) => Some(result),
            _ => None,
        }
    }

    /// Reclaim the buffer once the flight is over.
    #[must_use]
    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::FileSink;
    use std::time::Duration;
    use tempfile::tempdir;

    fn filled(text: &[u8]) -> Buffer {
        let mut buffer = Buffer::with_capacity(text.len().max(8));
        buffer.extend_from_slice(text);
        buffer
    }

    #[test]
    fn test_resume_records_result() {
        let mut task = WriteTask::new(9, filled(b"abc"), 1);
        assert_eq!(task.state(), TaskState::Initial);
        assert_eq!(task.payload_len(), 3);

        task.state = TaskState::Suspended;
        task.resume(3);
        assert!(task.is_done());
        assert_eq!(task.result(), Some(3));
        assert_eq!(task.into_buffer().as_slice(), b"abc");
    }

    #[test]
    fn test_start_suspends_and_completes() {
        let Ok(mut ring) = IoRing::new(8) else {
            eprintln!("io_uring not available, skipping test");
            return;
        };
        let dir = tempdir().unwrap();
        let sink = FileSink::open(dir.path().join("task.log")).unwrap();

        let mut task = WriteTask::new(1, filled(b"line\n"), 1);
        assert!(task.start(&mut ring, sink.raw_fd()));
        assert_eq!(task.state(), TaskState::Suspended);
        assert!(ring.submit_pending());

        let mut completions = Vec::new();
        while completions.is_empty() {
            ring.wait_completion(Duration::from_millis(100));
            completions = ring.reap_completions();
        }
        assert_eq!(completions[0].token, 1);
        task.resume(completions[0].result);
        assert_eq!(task.result(), Some(5));
    }

    #[test]
    fn test_failed_ring_resolves_synchronously() {
        let Ok(mut ring) = IoRing::new(8) else {
            eprintln!("io_uring not available, skipping test");
            return;
        };
        ring.mark_failed();

        let mut task = WriteTask::new(2, filled(b"x"), 1);
        assert!(!task.start(&mut ring, 1));
        assert_eq!(task.result(), Some(-libc::EIO));
    }
}
