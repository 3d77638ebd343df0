//! Submission/completion ring adapter for asynchronous file writes.
//!
//! Thin wrapper over the kernel ring: prepares append writes referencing
//! caller-owned buffers, flushes them in batches, and harvests completion
//! entries carrying the submitter's token. The buffer behind an in-flight
//! entry must stay alive and unmoved until its completion is reaped; the
//! owning write task guarantees that.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use io_uring::types::Fd;
use io_uring::{opcode, IoUring};

use crate::error::RingError;
use crate::pool::Buffer;

/// Result of one reaped kernel operation.
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    /// Token the submitter attached to the operation.
    pub token: u64,
    /// Bytes written, or a negative errno.
    pub result: i32,
}

impl Completion {
    /// True when the kernel reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result >= 0
    }

    /// The kernel error, if any.
    #[must_use]
    pub fn error(&self) -> Option<io::Error> {
        if self.result < 0 {
            Some(io::Error::from_raw_os_error(-self.result))
        } else {
            None
        }
    }

    /// Bytes transferred on success.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn bytes_written(&self) -> Option<u64> {
        if self.result >= 0 {
            Some(self.result as u64)
        } else {
            None
        }
    }
}

/// Counters for ring activity.
#[derive(Debug, Default, Clone, Copy)]
pub struct RingMetrics {
    /// Write entries pushed to the submission queue.
    pub writes_prepared: u64,
    /// `submit` calls that reached the kernel.
    pub submissions: u64,
    /// Completions with a non-negative result.
    pub completions_success: u64,
    /// Completions with a negative result.
    pub completions_failed: u64,
    /// Total bytes the kernel reported written.
    pub bytes_written: u64,
}

/// Kernel ring of fixed depth issuing append writes.
///
/// Single-threaded by design: only the consumer loop drives it. The
/// `operational` flag transitions irreversibly to false on the first
/// unrecoverable kernel failure.
pub struct IoRing {
    ring: IoUring,
    depth: u32,
    operational: AtomicBool,
    metrics: RingMetrics,
}

impl std::fmt::Debug for IoRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoRing")
            .field("depth", &self.depth)
            .field("operational", &self.is_operational())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl IoRing {
    /// Create a ring with (at least) `depth` submission entries; the
    /// kernel rounds the count up to a power of two.
    ///
    /// # Errors
    ///
    /// Returns an error if ring creation fails (old kernel, container
    /// seccomp policy, resource limits).
    pub fn new(depth: u32) -> Result<Self, RingError> {
        let ring = IoUring::new(depth).map_err(RingError::Create)?;
        Ok(Self {
            ring,
            depth,
            operational: AtomicBool::new(true),
            metrics: RingMetrics::default(),
        })
    }

    /// Requested submission queue depth.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// False once the ring failed permanently.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        self.operational.load(Ordering::Acquire)
    }

    /// Sticky failure: the flag never returns to true.
    pub fn mark_failed(&self) {
        self.operational.store(false, Ordering::Release);
    }

    /// Ring activity counters.
    #[must_use]
    pub const fn metrics(&self) -> &RingMetrics {
        &self.metrics
    }

    /// Prepare one append write of `buffer`'s filled bytes to `fd`,
    /// tagged with `token`.
    ///
    /// The entry is only queued; [`Self::submit_pending`] hands it to the
    /// kernel. The caller must keep `buffer` alive and unmoved until the
    /// completion carrying `token` is reaped.
    ///
    /// # Errors
    ///
    /// [`RingError::SubmissionQueueFull`] when no entry slot is free right
    /// now (normal backpressure), [`RingError::NotOperational`] after a
    /// permanent failure.
    #[allow(clippy::cast_possible_truncation)]
    pub fn prepare_write(
        &mut self,
        fd: RawFd,
        buffer: &Buffer,
        token: u64,
    ) -> Result<(), RingError> {
        if !self.is_operational() {
            return Err(RingError::NotOperational);
        }

        // Offset -1: write at the current file position; the sink's
        // O_APPEND descriptor makes that the end of file.
        let entry = opcode::Write::new(Fd(fd), buffer.as_ptr(), buffer.len() as u32)
            .offset(u64::MAX)
            .build()
            .user_data(token);

        // SAFETY: the entry references memory owned by `buffer`, which the
        // calling task keeps alive until this token is reaped.
        unsafe {
            self.ring
                .submission()
                .push(&entry)
                .map_err(|_| RingError::SubmissionQueueFull)?;
        }

        self.metrics.writes_prepared += 1;
        Ok(())
    }

    /// Flush prepared entries to the kernel.
    ///
    /// Returns `false` on permanent kernel failure (the ring is marked
    /// non-operational). Interrupted or momentarily busy submissions are
    /// transient: the entries stay queued for the next call.
    pub fn submit_pending(&mut self) -> bool {
        if !self.is_operational() {
            return false;
        }
        match self.ring.submit() {
            Ok(_) => {
                self.metrics.submissions += 1;
                true
            }
            Err(err) => {
                let err = RingError::Submit(err);
                if err.is_transient() {
                    tracing::warn!(error = %err, "transient io_uring submit failure, will retry");
                    true
                } else {
                    tracing::error!(error = %err, "io_uring submit failed, marking ring non-operational");
                    self.mark_failed();
                    false
                }
            }
        }
    }

    /// Harvest every currently ready completion.
    #[must_use]
    pub fn reap_completions(&mut self) -> Vec<Completion> {
        let mut completions = Vec::new();
        for cqe in self.ring.completion() {
            let completion = Completion {
                token: cqe.user_data(),
                result: cqe.result(),
            };
            if completion.is_success() {
                self.metrics.completions_success += 1;
                self.metrics.bytes_written += completion.bytes_written().unwrap_or(0);
            } else {
                self.metrics.completions_failed += 1;
            }
            completions.push(completion);
        }
        completions
    }

    /// Block up to `timeout` for at least one completion to become ready.
    ///
    /// Returns `true` when a completion is (or became) available, `false`
    /// on timeout. A permanent wait failure marks the ring non-operational.
    pub fn wait_completion(&mut self, timeout: Duration) -> bool {
        if !self.is_operational() {
            return false;
        }
        let timespec = io_uring::types::Timespec::new()
            .sec(timeout.as_secs())
            .nsec(timeout.subsec_nanos());
        let args = io_uring::types::SubmitArgs::new().timespec(&timespec);

        match self.ring.submitter().submit_with_args(1, &args) {
            Ok(_) => true,
            Err(err) if err.raw_os_error() == Some(libc::ETIME) => false,
            Err(err) => {
                let err = RingError::Wait(err);
                if err.is_fatal() {
                    tracing::error!(error = %err, "io_uring wait failed, marking ring non-operational");
                    self.mark_failed();
                }
                false
            }
        }
    }
}
