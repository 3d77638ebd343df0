//! Record formatting and write coalescing.
//!
//! The preparer turns [`WriteRecord`]s into buffers the ring can submit.
//! In coalescing mode, records are formatted back-to-back into a fixed
//! staging region and copied out as one pooled buffer when the configured
//! record count or the region's high-water mark is reached; otherwise each
//! record gets its own buffer.

use std::io::{self, Write};
use std::sync::Arc;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::config::{report, ErrorReporter};
use crate::pool::{Buffer, BufferPool};
use crate::record::WriteRecord;

/// On-disk timestamp layout, UTC with microsecond precision.
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

/// Flush the staging region once it is more than 90% full, even before the
/// coalesce count is reached.
const STAGING_HIGH_WATER_NUM: usize = 9;
const STAGING_HIGH_WATER_DEN: usize = 10;

/// Extra room reserved for framing around a payload in individual mode.
const FRAMING_RESERVE: usize = 256;

/// Preparer tuning.
#[derive(Debug, Clone, Copy)]
pub struct PreparerConfig {
    /// Records per coalesced write; values `<= 1` disable coalescing.
    pub coalesce_size: u16,
    /// Capacity of the staging region in bytes.
    pub staging_capacity: usize,
}

impl Default for PreparerConfig {
    fn default() -> Self {
        Self {
            coalesce_size: 32,
            staging_capacity: 16 * 1024,
        }
    }
}

/// Outcome of preparing one record.
#[derive(Debug)]
pub struct PreparedWrite {
    /// A buffer ready for submission, or `None` when the record was
    /// deferred into the staging region (or dropped on a reported error).
    pub buffer: Option<Buffer>,
    /// True when the caller should flush prepared submissions now.
    pub flush_now: bool,
}

impl PreparedWrite {
    const fn staged() -> Self {
        Self {
            buffer: None,
            flush_now: false,
        }
    }
}

/// Formats records into buffers and optionally coalesces them.
///
/// Single-threaded: owned and driven only by the consumer loop.
pub struct WritePreparer {
    coalesce_size: u16,
    staging: Box<[u8]>,
    staged_len: usize,
    staged_records: usize,
    pool: Arc<BufferPool>,
    reporter: ErrorReporter,
}

impl std::fmt::Debug for WritePreparer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePreparer")
            .field("coalesce_size", &self.coalesce_size)
            .field("staging_capacity", &self.staging.len())
            .field("staged_len", &self.staged_len)
            .field("staged_records", &self.staged_records)
            .finish_non_exhaustive()
    }
}

impl WritePreparer {
    /// New preparer drawing copy-out buffers from `pool`.
    #[must_use]
    pub fn new(config: PreparerConfig, pool: Arc<BufferPool>, reporter: ErrorReporter) -> Self {
        Self {
            coalesce_size: config.coalesce_size,
            staging: vec![0u8; config.staging_capacity].into_boxed_slice(),
            staged_len: 0,
            staged_records: 0,
            pool,
            reporter,
        }
    }

    /// True when the staging region holds deferred records.
    #[must_use]
    pub const fn has_staged(&self) -> bool {
        self.staged_len > 0
    }

    /// Number of records currently deferred in staging.
    #[must_use]
    pub const fn staged_records(&self) -> usize {
        self.staged_records
    }

    /// Prepare one record for submission.
    pub fn prepare(&mut self, record: WriteRecord) -> PreparedWrite {
        if self.coalesce_size > 1 {
            self.prepare_coalesced(&record)
        } else {
            PreparedWrite {
                buffer: self.prepare_individual(&record),
                flush_now: false,
            }
        }
    }

    /// Copy staged bytes out into a pooled buffer and reset the region.
    /// `None` when nothing is staged.
    pub fn flush_staged(&mut self) -> Option<Buffer> {
        if self.staged_len == 0 {
            return None;
        }
        let mut buffer = self.pool.acquire(self.staged_len);
        buffer.extend_from_slice(&self.staging[..self.staged_len]);
        self.staged_len = 0;
        self.staged_records = 0;
        Some(buffer)
    }

    fn prepare_coalesced(&mut self, record: &WriteRecord) -> PreparedWrite {
        if let Some(written) = format_record(record, &mut self.staging[self.staged_len..]) {
            self.staged_len += written;
            self.staged_records += 1;

            let high_water =
                self.staging.len() * STAGING_HIGH_WATER_NUM / STAGING_HIGH_WATER_DEN;
            let should_flush = self.staged_records >= usize::from(self.coalesce_size)
                || self.staged_len > high_water;
            if should_flush {
                return PreparedWrite {
                    buffer: self.flush_staged(),
                    flush_now: true,
                };
            }
            return PreparedWrite::staged();
        }

        // The record did not fit the remaining space: flush whatever is
        // staged first, then fall back to an individual write.
        match self.flush_staged() {
            Some(buffer) => {
                // One buffer per prepared call: the staged flush claims it
                // and the overflowing record is dropped. Documented lossy
                // behavior.
                report(
                    &self.reporter,
                    &format!(
                        "dropping record ({} bytes of payload) that overflowed the staging region",
                        record.payload.len()
                    ),
                );
                PreparedWrite {
                    buffer: Some(buffer),
                    flush_now: true,
                }
            }
            None => PreparedWrite {
                buffer: self.prepare_individual(record),
                flush_now: false,
            },
        }
    }

    fn prepare_individual(&mut self, record: &WriteRecord) -> Option<Buffer> {
        let mut buffer = self.pool.acquire(record.payload.len() + FRAMING_RESERVE);
        match format_record(record, buffer.region_mut()) {
            Some(written) => {
                buffer.set_len(written);
                Some(buffer)
            }
            None => {
                report(
                    &self.reporter,
                    &format!(
                        "failed to format record ({} bytes of payload), dropping it",
                        record.payload.len()
                    ),
                );
                self.pool.release(buffer);
                None
            }
        }
    }
}

/// All-or-nothing writer over a fixed byte region.
struct SliceWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl Write for SliceWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let end = self.pos + data.len();
        if end > self.out.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "formatted line exceeds region capacity",
            ));
        }
        self.out[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Format one record as its on-disk line into `out`.
///
/// Returns the byte count, or `None` when the line does not fit.
///
/// Line grammar:
/// `[<timestamp>] [<LEVEL>] [Thread: <tag>]: <payload>\n`, with an
/// additional `[Seq: <n>]` block before the colon in sequence-tag builds.
pub(crate) fn format_record(record: &WriteRecord, out: &mut [u8]) -> Option<usize> {
    let mut writer = SliceWriter { out, pos: 0 };
    write_line(&mut writer, record).ok()?;
    Some(writer.pos)
}

fn write_line(writer: &mut SliceWriter<'_>, record: &WriteRecord) -> io::Result<()> {
    writer.write_all(b"[")?;
    record
        .timestamp
        .format_into(writer, TIMESTAMP_FORMAT)
        .map_err(|err| match err {
            time::error::Format::StdIo(io_err) => io_err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })?;
    write!(
        writer,
        "] [{}] [Thread: {}]",
        record.severity.as_str(),
        record.producer_tag
    )?;
    #[cfg(feature = "seq-track")]
    write!(writer, " [Seq: {}]", record.sequence)?;
    writer.write_all(b": ")?;
    writer.write_all(record.payload.as_bytes())?;
    writer.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_error_reporter;
    use crate::record::Severity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn preparer(coalesce: u16, staging: usize) -> WritePreparer {
        WritePreparer::new(
            PreparerConfig {
                coalesce_size: coalesce,
                staging_capacity: staging,
            },
            Arc::new(BufferPool::default()),
            default_error_reporter(),
        )
    }

    fn record(payload: &str) -> WriteRecord {
        WriteRecord::new(Severity::Info, payload.to_string())
    }

    fn line_of(buffer: &Buffer) -> String {
        String::from_utf8(buffer.as_slice().to_vec()).unwrap()
    }

    #[test]
    fn test_format_grammar() {
        let mut out = [0u8; 512];
        let rec = WriteRecord::new(Severity::Warn, "hello world".to_string());
        let written = format_record(&rec, &mut out).unwrap();
        let line = std::str::from_utf8(&out[..written]).unwrap();

        assert!(line.starts_with('['));
        assert!(line.ends_with(": hello world\n"));
        assert!(line.contains("] [WARN] [Thread: "));
        // ISO-like instant: date, 'T', time with fractional seconds.
        let ts = &line[1..line.find(']').unwrap()];
        assert!(ts.contains('T'));
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('.'));
    }

    #[test]
    fn test_format_overflow_returns_none() {
        let mut out = [0u8; 32];
        let rec = record("a payload that cannot fit in thirty-two bytes");
        assert!(format_record(&rec, &mut out).is_none());
    }

    #[test]
    fn test_individual_mode_formats_exactly() {
        let mut prep = preparer(0, 16 * 1024);
        let rec = record("solo");
        let mut expected = [0u8; 1024];
        let expected_len = format_record(&rec, &mut expected).unwrap();

        let prepared = prep.prepare(rec);
        assert!(!prepared.flush_now);
        let buffer = prepared.buffer.unwrap();
        assert_eq!(buffer.as_slice(), &expected[..expected_len]);
    }

    #[test]
    fn test_coalesce_accumulates_until_count() {
        let mut prep = preparer(3, 16 * 1024);

        let first = prep.prepare(record("one"));
        assert!(first.buffer.is_none());
        assert!(!first.flush_now);
        let second = prep.prepare(record("two"));
        assert!(second.buffer.is_none());
        assert_eq!(prep.staged_records(), 2);

        let third = prep.prepare(record("three"));
        assert!(third.flush_now);
        let buffer = third.buffer.unwrap();
        let text = line_of(&buffer);
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains(": one\n"));
        assert!(text.contains(": two\n"));
        assert!(text.contains(": three\n"));
        assert!(!prep.has_staged());
    }

    #[test]
    fn test_coalesced_content_is_concatenation() {
        let mut prep = preparer(2, 16 * 1024);
        let r1 = record("alpha");
        let r2 = record("beta");
        let mut scratch = [0u8; 1024];
        let l1 = format_record(&r1, &mut scratch).unwrap();
        let expected_first = scratch[..l1].to_vec();
        let l2 = format_record(&r2, &mut scratch).unwrap();
        let expected_second = scratch[..l2].to_vec();

        assert!(prep.prepare(r1).buffer.is_none());
        let buffer = prep.prepare(r2).buffer.unwrap();
        let mut expected = expected_first;
        expected.extend_from_slice(&expected_second);
        assert_eq!(buffer.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_high_water_flushes_early() {
        // Staging of 256 bytes with a huge coalesce count: the 90% mark
        // forces the flush instead.
        let mut prep = preparer(100, 256);
        let mut flushed = None;
        for i in 0..10 {
            let prepared = prep.prepare(record(&format!("filler-{i}-xxxxxxxxxxxxxxxx")));
            if prepared.buffer.is_some() {
                flushed = prepared.buffer;
                break;
            }
        }
        let buffer = flushed.expect("high-water mark never triggered");
        assert!(buffer.len() > 0);
    }

    #[test]
    fn test_overflow_flushes_staged_and_drops_record() {
        let reports = Arc::new(AtomicUsize::new(0));
        let reporter: ErrorReporter = {
            let reports = Arc::clone(&reports);
            Arc::new(move |_msg: &str| {
                reports.fetch_add(1, Ordering::SeqCst);
            })
        };
        let mut prep = WritePreparer::new(
            PreparerConfig {
                coalesce_size: 100,
                staging_capacity: 512,
            },
            Arc::new(BufferPool::default()),
            reporter,
        );

        assert!(prep.prepare(record("small-opener")).buffer.is_none());
        // Too big for the remaining space (though it would fit an empty
        // region): the staged flush claims the buffer slot and the record
        // is dropped with a report.
        let prepared = prep.prepare(record(&"y".repeat(420)));
        assert!(prepared.flush_now);
        let buffer = prepared.buffer.expect("staged content must flush on overflow");
        assert!(line_of(&buffer).contains(": small-opener\n"));
        assert!(!line_of(&buffer).contains('y'));
        assert_eq!(reports.load(Ordering::SeqCst), 1);
        assert!(!prep.has_staged());
        assert_eq!(prep.staged_records(), 0);
    }

    #[test]
    fn test_record_larger_than_staging_alone_goes_individual() {
        let mut prep = preparer(4, 128);
        let prepared = prep.prepare(record(&"z".repeat(400)));
        assert!(!prepared.flush_now);
        let buffer = prepared.buffer.expect("oversized record must write individually");
        assert!(line_of(&buffer).contains(&"z".repeat(400)));
        assert!(!prep.has_staged());
    }

    #[test]
    fn test_record_larger_than_staging_with_staged_content_drops() {
        let reports = Arc::new(AtomicUsize::new(0));
        let reporter: ErrorReporter = {
            let reports = Arc::clone(&reports);
            Arc::new(move |_msg: &str| {
                reports.fetch_add(1, Ordering::SeqCst);
            })
        };
        let mut prep = WritePreparer::new(
            PreparerConfig {
                coalesce_size: 10,
                staging_capacity: 256,
            },
            Arc::new(BufferPool::default()),
            reporter,
        );

        assert!(prep.prepare(record("small")).buffer.is_none());
        let prepared = prep.prepare(record(&"w".repeat(600)));
        // The staged flush wins the single buffer slot; the oversized
        // record is reported and dropped.
        assert!(prepared.flush_now);
        let buffer = prepared.buffer.unwrap();
        assert!(line_of(&buffer).contains(": small\n"));
        assert!(!line_of(&buffer).contains('w'));
        assert_eq!(reports.load(Ordering::SeqCst), 1);
        assert!(!prep.has_staged());
    }

    #[test]
    fn test_flush_staged_empty_is_none() {
        let mut prep = preparer(4, 1024);
        assert!(prep.flush_staged().is_none());
        assert!(prep.prepare(record("deferred")).buffer.is_none());
        let buffer = prep.flush_staged().unwrap();
        assert!(line_of(&buffer).ends_with(": deferred\n"));
        assert!(prep.flush_staged().is_none());
    }
}
