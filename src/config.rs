//! Logger configuration, validation, and auto-scaling.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::pool::ClassSpec;
use crate::queue::HandoffQueue;

/// Callback invoked for internal logger errors.
///
/// Must be re-entrant and must not panic; it can be called from the
/// consumer thread while user threads are logging.
pub type ErrorReporter = Arc<dyn Fn(&str) + Send + Sync>;

/// Default reporter: `"[Logger ERROR] <msg>"` on standard error.
///
/// Standard error is the last-resort channel; nothing else in the logger
/// writes there.
#[must_use]
pub fn default_error_reporter() -> ErrorReporter {
    Arc::new(|msg: &str| {
        eprintln!("[Logger ERROR] {msg}");
    })
}

/// Invoke the reporter, falling back to raw standard error if it panics.
///
/// The contract asks reporters to be non-panicking; this keeps a
/// misbehaving one from unwinding the consumer thread.
pub(crate) fn report(reporter: &ErrorReporter, message: &str) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| reporter(message)));
    if outcome.is_err() {
        eprintln!("[Logger CRITICAL] error reporter panicked; original message: {message}");
    }
}

/// Everything the logger can be tuned with.
///
/// `batch_size` is the primary knob: when `queue_depth` or `coalesce_size`
/// are left unset they are derived from it (`16 × batch` and `batch`).
/// Numeric fields set to zero inherit their defaults, except
/// `coalesce_size`, where an explicit `Some(0)` disables coalescing.
#[derive(Clone)]
pub struct LoggerConfig {
    /// Callback for internal errors. Defaults to the stderr reporter.
    pub error_reporter: ErrorReporter,
    /// Initial target path of the active log file.
    pub log_file_name: PathBuf,
    /// Rotation threshold in bytes.
    pub max_log_size_bytes: u64,
    /// Records per kernel submission (`submit_pending` trigger).
    pub batch_size: u16,
    /// Kernel ring depth and internal capacity hint. `None` derives
    /// `16 × batch_size`.
    pub queue_depth: Option<u16>,
    /// Records per coalesced write. `None` derives `batch_size`;
    /// `Some(0)` disables coalescing.
    pub coalesce_size: Option<u16>,
    /// Small pool slot count.
    pub small_buffer_pool_size: u16,
    /// Medium pool slot count.
    pub medium_buffer_pool_size: u16,
    /// Large pool slot count.
    pub large_buffer_pool_size: u16,
    /// Small buffer capacity in bytes.
    pub small_buffer_size: u16,
    /// Medium buffer capacity in bytes.
    pub medium_buffer_size: u16,
    /// Large buffer capacity in bytes.
    pub large_buffer_size: u16,
    /// Worker join deadline in seconds during destruction.
    pub shutdown_timeout_seconds: u16,
    /// Pluggable hand-off queue; `None` selects the unbounded guarded
    /// variant. Supplying a bounded queue turns on producer backpressure.
    pub queue: Option<Arc<dyn HandoffQueue>>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            error_reporter: default_error_reporter(),
            log_file_name: PathBuf::from("output.log"),
            max_log_size_bytes: 5 * 1024 * 1024,
            batch_size: 32,
            queue_depth: None,
            coalesce_size: None,
            small_buffer_pool_size: 512,
            medium_buffer_pool_size: 256,
            large_buffer_pool_size: 128,
            small_buffer_size: 1024,
            medium_buffer_size: 4096,
            large_buffer_size: 16384,
            shutdown_timeout_seconds: 3,
            queue: None,
        }
    }
}

impl std::fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("log_file_name", &self.log_file_name)
            .field("max_log_size_bytes", &self.max_log_size_bytes)
            .field("batch_size", &self.batch_size)
            .field("queue_depth", &self.queue_depth)
            .field("coalesce_size", &self.coalesce_size)
            .field("shutdown_timeout_seconds", &self.shutdown_timeout_seconds)
            .field("custom_queue", &self.queue.is_some())
            .finish_non_exhaustive()
    }
}

impl LoggerConfig {
    /// Start a builder.
    #[must_use]
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::default()
    }

    /// Apply defaulting and auto-scaling, then check parameter relations.
    ///
    /// Emits non-fatal `tracing` warnings for configurations that are legal
    /// but unlikely to perform well.
    ///
    /// # Errors
    ///
    /// Returns an error for parameter combinations the logger refuses to
    /// run with.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let batch_size = if self.batch_size == 0 { 32 } else { self.batch_size };
        let queue_depth = match self.queue_depth {
            Some(depth) => depth,
            None => batch_size.saturating_mul(16),
        };
        let coalesce_size = self.coalesce_size.unwrap_or(batch_size);

        if queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if batch_size > queue_depth {
            return Err(ConfigError::BatchExceedsQueueDepth {
                batch_size,
                queue_depth,
            });
        }

        if batch_size > queue_depth / 2 {
            tracing::warn!(
                batch_size,
                queue_depth,
                "batch_size above half the queue depth leaves little pipeline headroom"
            );
        }
        if queue_depth < 8 * batch_size {
            tracing::warn!(
                batch_size,
                queue_depth,
                "queue_depth below 8x batch_size limits I/O pipelining"
            );
        }
        if coalesce_size > 0 {
            let ratio = f64::from(coalesce_size) / f64::from(batch_size);
            if !(0.5..=2.0).contains(&ratio) {
                tracing::warn!(
                    coalesce_size,
                    batch_size,
                    "coalesce_size far from batch_size defeats submission batching"
                );
            }
        }

        Ok(ResolvedConfig {
            batch_size: usize::from(batch_size),
            queue_depth: u32::from(queue_depth),
            coalesce_size,
            small: ClassSpec {
                slots: default_nonzero(self.small_buffer_pool_size, 512),
                capacity: default_nonzero(self.small_buffer_size, 1024),
            },
            medium: ClassSpec {
                slots: default_nonzero(self.medium_buffer_pool_size, 256),
                capacity: default_nonzero(self.medium_buffer_size, 4096),
            },
            large: ClassSpec {
                slots: default_nonzero(self.large_buffer_pool_size, 128),
                capacity: default_nonzero(self.large_buffer_size, 16384),
            },
            max_log_size_bytes: self.max_log_size_bytes,
            shutdown_timeout_seconds: if self.shutdown_timeout_seconds == 0 {
                3
            } else {
                u64::from(self.shutdown_timeout_seconds)
            },
        })
    }
}

fn default_nonzero(value: u16, fallback: usize) -> usize {
    if value == 0 {
        fallback
    } else {
        usize::from(value)
    }
}

/// Concrete parameters after defaulting and auto-scaling.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedConfig {
    /// Records per kernel submission.
    pub batch_size: usize,
    /// Ring depth.
    pub queue_depth: u32,
    /// Records per coalesced write (0 = coalescing disabled).
    pub coalesce_size: u16,
    /// Small class geometry.
    pub small: ClassSpec,
    /// Medium class geometry.
    pub medium: ClassSpec,
    /// Large class geometry.
    pub large: ClassSpec,
    /// Rotation threshold in bytes.
    pub max_log_size_bytes: u64,
    /// Worker join deadline in seconds.
    pub shutdown_timeout_seconds: u64,
}

/// Builder mirroring every [`LoggerConfig`] field.
#[derive(Default)]
pub struct LoggerConfigBuilder {
    config: LoggerConfig,
}

impl std::fmt::Debug for LoggerConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl LoggerConfigBuilder {
    /// Set the internal error reporter.
    #[must_use]
    pub fn error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.config.error_reporter = reporter;
        self
    }

    /// Set the active log file path.
    #[must_use]
    pub fn log_file_name<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.log_file_name = path.into();
        self
    }

    /// Set the rotation threshold in bytes.
    #[must_use]
    pub fn max_log_size_bytes(mut self, bytes: u64) -> Self {
        self.config.max_log_size_bytes = bytes;
        self
    }

    /// Set the submission batch size.
    #[must_use]
    pub fn batch_size(mut self, records: u16) -> Self {
        self.config.batch_size = records;
        self
    }

    /// Set the ring depth explicitly (otherwise `16 × batch_size`).
    #[must_use]
    pub fn queue_depth(mut self, depth: u16) -> Self {
        self.config.queue_depth = Some(depth);
        self
    }

    /// Set the coalescing count explicitly; 0 disables coalescing.
    #[must_use]
    pub fn coalesce_size(mut self, records: u16) -> Self {
        self.config.coalesce_size = Some(records);
        self
    }

    /// Set per-class pool slot counts.
    #[must_use]
    pub fn pool_sizes(mut self, small: u16, medium: u16, large: u16) -> Self {
        self.config.small_buffer_pool_size = small;
        self.config.medium_buffer_pool_size = medium;
        self.config.large_buffer_pool_size = large;
        self
    }

    /// Set per-class buffer capacities in bytes.
    #[must_use]
    pub fn buffer_sizes(mut self, small: u16, medium: u16, large: u16) -> Self {
        self.config.small_buffer_size = small;
        self.config.medium_buffer_size = medium;
        self.config.large_buffer_size = large;
        self
    }

    /// Set the worker join deadline in seconds.
    #[must_use]
    pub fn shutdown_timeout_seconds(mut self, seconds: u16) -> Self {
        self.config.shutdown_timeout_seconds = seconds;
        self
    }

    /// Supply a hand-off queue implementation (e.g. a bounded queue for
    /// producer backpressure).
    #[must_use]
    pub fn queue(mut self, queue: Arc<dyn HandoffQueue>) -> Self {
        self.config.queue = Some(queue);
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when parameter relations are invalid.
    pub fn build(self) -> Result<LoggerConfig, ConfigError> {
        self.config.resolve()?;
        Ok(self.config)
    }

    /// Produce the configuration without validation (tests).
    #[must_use]
    pub fn build_unchecked(self) -> LoggerConfig {
        self.config
    }
}
