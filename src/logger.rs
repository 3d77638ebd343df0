//! The logger façade: construction, the producer API, flush, shutdown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::{report, ErrorReporter, LoggerConfig};
use crate::consumer::{ConsumerLoop, ConsumerSetup, FlushSignal};
use crate::error::Result;
use crate::pool::BufferPool;
use crate::prepare::{PreparerConfig, WritePreparer};
use crate::queue::{HandoffQueue, UnboundedQueue};
use crate::record::{Severity, WriteRecord};
use crate::ring::IoRing;
use crate::rotate::FileRotater;
use crate::sink::FileSink;

/// Consumer-exit rendezvous backing the bounded destructor join.
#[derive(Debug, Default)]
struct WorkerDone {
    lock: Mutex<bool>,
    cond: Condvar,
}

impl WorkerDone {
    fn mark(&self) {
        let mut done = self.lock.lock();
        *done = true;
        self.cond.notify_all();
    }

    /// True when the worker finished before the deadline.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.lock.lock();
        while !*done {
            if self.cond.wait_until(&mut done, deadline).timed_out() {
                return *done;
            }
        }
        true
    }
}

/// Asynchronous rotating file logger.
///
/// `log` never blocks on I/O and never returns an error to the caller:
/// records are handed to a dedicated consumer thread through the
/// configured queue (the bounded variant may block on backpressure), and
/// every internal failure is routed through the error reporter instead.
///
/// Dropping the logger shuts the queue, stops the consumer after it has
/// drained everything accepted so far, and joins it with the configured
/// timeout.
pub struct Logger {
    queue: Arc<dyn HandoffQueue>,
    stop: Arc<AtomicBool>,
    active_work: Arc<AtomicUsize>,
    flush_signal: Arc<FlushSignal>,
    worker: Option<JoinHandle<()>>,
    worker_done: Arc<WorkerDone>,
    shutdown_timeout: Duration,
    reporter: ErrorReporter,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("queued", &self.queue.len())
            .field("active_work", &self.active_work.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Construct the logger and start its consumer thread.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration, when the log file
    /// cannot be opened, when the kernel ring cannot be created, or when
    /// the consumer thread cannot be spawned. This is the only path that
    /// surfaces errors directly; everything after construction goes
    /// through the error reporter.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(config: LoggerConfig) -> Result<Self> {
        let resolved = config.resolve()?;

        let pool = Arc::new(BufferPool::new(resolved.small, resolved.medium, resolved.large));
        let sink = FileSink::open(&config.log_file_name)?;
        let rotater = FileRotater::new(&config.log_file_name, resolved.max_log_size_bytes);
        let ring = IoRing::new(resolved.queue_depth)?;

        let queue: Arc<dyn HandoffQueue> = config
            .queue
            .clone()
            .unwrap_or_else(|| Arc::new(UnboundedQueue::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let active_work = Arc::new(AtomicUsize::new(0));
        let flush_signal = Arc::new(FlushSignal::new());
        let reporter = Arc::clone(&config.error_reporter);

        let preparer = WritePreparer::new(
            PreparerConfig {
                coalesce_size: resolved.coalesce_size,
                ..PreparerConfig::default()
            },
            Arc::clone(&pool),
            Arc::clone(&reporter),
        );

        let consumer = ConsumerLoop::new(ConsumerSetup {
            queue: Arc::clone(&queue),
            pool,
            preparer,
            ring,
            sink,
            rotater,
            batch_size: resolved.batch_size,
            queue_depth: resolved.queue_depth as usize,
            active_work: Arc::clone(&active_work),
            stop: Arc::clone(&stop),
            flush_signal: Arc::clone(&flush_signal),
            reporter: Arc::clone(&reporter),
        });

        let worker_done = Arc::new(WorkerDone::default());
        let worker = std::thread::Builder::new()
            .name("uringlog-consumer".to_string())
            .spawn({
                let worker_done = Arc::clone(&worker_done);
                move || {
                    consumer.run();
                    worker_done.mark();
                }
            })?;

        Ok(Self {
            queue,
            stop,
            active_work,
            flush_signal,
            worker: Some(worker),
            worker_done,
            shutdown_timeout: Duration::from_secs(resolved.shutdown_timeout_seconds),
            reporter,
        })
    }

    /// Enqueue one message, stamping the calling thread's tag and the
    /// current instant. Never returns an error; with a bounded queue this
    /// may block on backpressure.
    pub fn log(&self, severity: Severity, payload: impl Into<String>) {
        self.queue.push(WriteRecord::new(severity, payload.into()));
    }

    /// Log at [`Severity::Info`].
    pub fn info(&self, payload: impl Into<String>) {
        self.log(Severity::Info, payload);
    }

    /// Log at [`Severity::Warn`].
    pub fn warn(&self, payload: impl Into<String>) {
        self.log(Severity::Warn, payload);
    }

    /// Log at [`Severity::Error`].
    pub fn error(&self, payload: impl Into<String>) {
        self.log(Severity::Error, payload);
    }

    /// Block until every record accepted so far has been written through
    /// the kernel: the queue is empty and no write task is outstanding.
    ///
    /// Safe to call from any number of threads concurrently. Returns even
    /// after a permanent ring failure (the consumer drains and discards,
    /// then signals).
    pub fn flush(&self) {
        self.flush_signal
            .wait_until(|| self.queue.is_empty() && self.active_work.load(Ordering::SeqCst) == 0);
    }

    /// Best-effort count of records waiting in the hand-off queue.
    #[must_use]
    pub fn queued_records(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        // Wake the consumer and any blocked producers, then request stop.
        self.queue.shutdown();
        self.stop.store(true, Ordering::Release);

        if self.worker_done.wait_timeout(self.shutdown_timeout) {
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        } else {
            report(
                &self.reporter,
                &format!(
                    "consumer thread did not stop within {}s, abandoning it",
                    self.shutdown_timeout.as_secs()
                ),
            );
            tracing::warn!(
                timeout_seconds = self.shutdown_timeout.as_secs(),
                "shutdown timeout expired, abandoning consumer thread"
            );
            drop(self.worker.take());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, Error};
    use tempfile::tempdir;

    fn try_logger(config: LoggerConfig) -> Option<Logger> {
        match Logger::new(config) {
            Ok(logger) => Some(logger),
            Err(Error::Ring(err)) => {
                eprintln!("io_uring not available, skipping test: {err}");
                None
            }
            Err(err) => panic!("unexpected construction failure: {err}"),
        }
    }

    #[test]
    fn test_invalid_config_surfaces() {
        let dir = tempdir().unwrap();
        let config = LoggerConfig::builder()
            .log_file_name(dir.path().join("x.log"))
            .batch_size(64)
            .queue_depth(16)
            .build_unchecked();
        assert!(matches!(
            Logger::new(config),
            Err(Error::Config(ConfigError::BatchExceedsQueueDepth { .. }))
        ));
    }

    #[test]
    fn test_unopenable_sink_surfaces() {
        let dir = tempdir().unwrap();
        let config = LoggerConfig::builder()
            .log_file_name(dir.path().join("missing").join("x.log"))
            .build_unchecked();
        assert!(matches!(Logger::new(config), Err(Error::Io(_))));
    }

    #[test]
    fn test_log_and_flush_writes_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("basic.log");
        let config = LoggerConfig::builder()
            .log_file_name(&path)
            .batch_size(4)
            .build_unchecked();
        let Some(logger) = try_logger(config) else { return };

        logger.info("first");
        logger.warn("second");
        logger.error("third");
        logger.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("[INFO]") && lines[0].ends_with(": first"));
        assert!(lines[1].contains("[WARN]") && lines[1].ends_with(": second"));
        assert!(lines[2].contains("[ERROR]") && lines[2].ends_with(": third"));
    }

    #[test]
    fn test_flush_on_idle_logger_returns_immediately() {
        let dir = tempdir().unwrap();
        let config = LoggerConfig::builder()
            .log_file_name(dir.path().join("idle.log"))
            .build_unchecked();
        let Some(logger) = try_logger(config) else { return };
        logger.flush();
        assert_eq!(logger.queued_records(), 0);
    }

    #[test]
    fn test_drop_drains_accepted_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drop.log");
        {
            let config = LoggerConfig::builder()
                .log_file_name(&path)
                .batch_size(8)
                .build_unchecked();
            let Some(logger) = try_logger(config) else { return };
            for i in 0..50 {
                logger.info(format!("message-{i}"));
            }
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 50);
    }
}
