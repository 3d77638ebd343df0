//! # uringlog
//!
//! An asynchronous, high-throughput, thread-safe application logger backed
//! by Linux `io_uring`.
//!
//! Producer threads hand formatted messages to a dedicated consumer thread
//! through an MPSC queue; the consumer formats records into pooled buffers,
//! optionally coalesces several records into a single write payload, and
//! submits the writes through a kernel submission/completion ring. Completed
//! byte counts feed a size-based file rotation policy.
//!
//! ```text
//! [producers] → Logger::log → HandoffQueue → ConsumerLoop
//!                                               ├─ WritePreparer (format + coalesce)
//!                                               ├─ BufferPool (pooled payloads)
//!                                               ├─ IoRing (submit / reap)
//!                                               └─ FileRotater → FileSink
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use uringlog::{Logger, LoggerConfig, Severity};
//!
//! let config = LoggerConfig::builder()
//!     .log_file_name("app.log")
//!     .batch_size(32)
//!     .build()?;
//!
//! let logger = Logger::new(config)?;
//! logger.info("server started");
//! logger.log(Severity::Warn, "queue depth above watermark");
//! logger.flush();
//! ```
//!
//! ## Platform support
//!
//! Linux 5.10+ only; ring creation fails cleanly elsewhere.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Unsafe is confined to the ring adapter (raw SQE submission).
#![allow(unsafe_code)]

pub mod config;
pub mod error;
pub mod logger;
pub mod pool;
pub mod prepare;
pub mod queue;
pub mod record;
pub mod ring;
pub mod rotate;
pub mod sink;
pub mod task;

mod consumer;

pub use config::{default_error_reporter, ErrorReporter, LoggerConfig, LoggerConfigBuilder};
pub use error::{ConfigError, Error, Result, RingError, RotateError};
pub use logger::Logger;
pub use record::{Severity, WriteRecord};

#[cfg(feature = "seq-track")]
pub use record::SequenceSource;
