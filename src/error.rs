//! Error types for logger construction and the I/O pipeline.

use std::io;
use std::path::PathBuf;

/// Errors raised by the submission/completion ring adapter.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// Failed to create the `io_uring` instance.
    #[error("failed to create io_uring ring: {0}")]
    Create(#[source] io::Error),

    /// The submission queue has no free entry right now.
    #[error("submission queue is full")]
    SubmissionQueueFull,

    /// Flushing prepared entries to the kernel failed.
    #[error("submission failed: {0}")]
    Submit(#[source] io::Error),

    /// Blocking for completions failed.
    #[error("wait for completions failed: {0}")]
    Wait(#[source] io::Error),

    /// The ring was marked non-operational by an earlier failure.
    #[error("ring is not operational")]
    NotOperational,
}

impl RingError {
    /// True when the condition clears on its own (retry next iteration):
    /// a momentarily full submission queue, or an interrupted or busy
    /// kernel call whose entries stay queued.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::SubmissionQueueFull => true,
            Self::Submit(err) | Self::Wait(err) => matches!(
                err.raw_os_error(),
                Some(libc::EINTR | libc::EAGAIN | libc::EBUSY)
            ),
            Self::Create(_) | Self::NotOperational => false,
        }
    }

    /// True when the ring cannot be used any further.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

/// Errors raised while rotating the active log file.
#[derive(Debug, thiserror::Error)]
pub enum RotateError {
    /// Renaming the active file to its rotation slot failed.
    #[error("failed to rename {from} to {to}: {source}", from = .from.display(), to = .to.display())]
    Rename {
        /// The active file being rotated aside.
        from: PathBuf,
        /// The rotation target name.
        to: PathBuf,
        /// The underlying filesystem error.
        #[source]
        source: io::Error,
    },

    /// Reopening the active file after the rename failed.
    #[error("failed to reopen {path} after rotation: {source}", path = .path.display())]
    Reopen {
        /// The active file path.
        path: PathBuf,
        /// The underlying filesystem error.
        #[source]
        source: io::Error,
    },
}

/// Invalid construction parameters.
///
/// This is the one error family that surfaces to the constructing caller
/// instead of being routed through the error reporter.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `batch_size` must not exceed `queue_depth`.
    #[error("batch_size ({batch_size}) must not exceed queue_depth ({queue_depth})")]
    BatchExceedsQueueDepth {
        /// Configured submission batch size.
        batch_size: u16,
        /// Configured (or derived) ring depth.
        queue_depth: u16,
    },

    /// The ring depth resolved to zero.
    #[error("queue_depth must be positive")]
    ZeroQueueDepth,
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration at construction.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ring creation or operation failure during construction.
    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    /// Log rotation failure.
    #[error("rotation error: {0}")]
    Rotate(#[from] RotateError),

    /// Filesystem failure (opening the sink, spawning the worker).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for logger operations.
pub type Result<T> = std::result::Result<T, Error>;
