//! Single-threaded consumer: drains the hand-off queue, prepares writes,
//! drives the ring, and feeds completion byte counts into rotation.
//!
//! The consumer thread is the sole owner of the ring, the staging buffer,
//! the sink, the rotater, and the live task set; producers only ever touch
//! the queue and the flush rendezvous.
//!
//! ## Outstanding-work accounting
//!
//! `active_work` counts records the consumer has claimed but not yet made
//! durable (or dropped). The counter is incremented *before* the pop that
//! may empty the queue, so at every instant an accepted record keeps
//! either the queue non-empty or the counter positive. The flush
//! predicate (`queue empty && active_work == 0`) can never observe a
//! deceptive idle state while a record sits in the staging region or in a
//! task. Coalesced tasks release one unit per record they carry.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::{report, ErrorReporter};
use crate::error::RotateError;
use crate::pool::{Buffer, BufferPool};
use crate::prepare::WritePreparer;
use crate::queue::HandoffQueue;
use crate::ring::IoRing;
use crate::rotate::FileRotater;
use crate::sink::FileSink;
use crate::task::WriteTask;

/// Sleep when there is nothing at all to do.
const IDLE_SLEEP: Duration = Duration::from_micros(10);
/// Bounded wait for completions when writes are in flight.
const COMPLETION_WAIT: Duration = Duration::from_micros(100);

/// Rendezvous between `flush()` callers and the consumer.
///
/// Waiters re-check their predicate under the signal lock; the consumer
/// takes the same lock to notify, so a wakeup between the check and the
/// wait cannot be lost.
#[derive(Debug, Default)]
pub(crate) struct FlushSignal {
    lock: Mutex<()>,
    cond: Condvar,
}

impl FlushSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wake every waiter.
    pub(crate) fn notify(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    /// Block until `predicate` is observed true under the signal lock.
    pub(crate) fn wait_until(&self, predicate: impl Fn() -> bool) {
        let mut guard = self.lock.lock();
        while !predicate() {
            self.cond.wait(&mut guard);
        }
    }
}

/// Upper bound on records drained per iteration, derived from the batch
/// size and ring depth so the loop cannot starve completion servicing:
/// `clamp(batch × √(depth/batch), batch × 2, depth / 2)`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn max_records_per_iteration(batch_size: usize, queue_depth: usize) -> usize {
    let ratio = queue_depth as f64 / batch_size as f64;
    let target = (batch_size as f64 * ratio.sqrt()) as usize;
    let lower = batch_size * 2;
    // Tight configs (batch > depth/4) would invert the clamp range; the
    // lower bound wins there.
    let upper = (queue_depth / 2).max(lower);
    target.clamp(lower, upper)
}

/// Everything the consumer needs, built by the logger façade.
pub(crate) struct ConsumerSetup {
    pub queue: Arc<dyn HandoffQueue>,
    pub pool: Arc<BufferPool>,
    pub preparer: WritePreparer,
    pub ring: IoRing,
    pub sink: FileSink,
    pub rotater: FileRotater,
    pub batch_size: usize,
    pub queue_depth: usize,
    pub active_work: Arc<AtomicUsize>,
    pub stop: Arc<AtomicBool>,
    pub flush_signal: Arc<FlushSignal>,
    pub reporter: ErrorReporter,
}

/// The drain → prepare → submit → reap pipeline.
pub(crate) struct ConsumerLoop {
    queue: Arc<dyn HandoffQueue>,
    pool: Arc<BufferPool>,
    preparer: WritePreparer,
    ring: IoRing,
    sink: FileSink,
    rotater: FileRotater,
    tasks: HashMap<u64, WriteTask>,
    next_token: u64,
    batch_size: usize,
    max_per_iteration: usize,
    /// Suspended tasks not yet flushed to the kernel.
    unsubmitted: usize,
    active_work: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    flush_signal: Arc<FlushSignal>,
    reporter: ErrorReporter,
}

impl ConsumerLoop {
    pub(crate) fn new(setup: ConsumerSetup) -> Self {
        let max_per_iteration = max_records_per_iteration(setup.batch_size, setup.queue_depth);
        Self {
            queue: setup.queue,
            pool: setup.pool,
            preparer: setup.preparer,
            ring: setup.ring,
            sink: setup.sink,
            rotater: setup.rotater,
            tasks: HashMap::new(),
            next_token: 0,
            batch_size: setup.batch_size,
            max_per_iteration,
            unsubmitted: 0,
            active_work: setup.active_work,
            stop: setup.stop,
            flush_signal: setup.flush_signal,
            reporter: setup.reporter,
        }
    }

    /// Run until stop is requested and everything accepted has drained,
    /// or until the ring fails permanently.
    pub(crate) fn run(mut self) {
        tracing::debug!(
            batch_size = self.batch_size,
            max_per_iteration = self.max_per_iteration,
            "consumer loop started"
        );

        loop {
            if !self.ring.is_operational() {
                self.abort_on_ring_failure();
                break;
            }

            self.drain_burst();

            // Whatever coalescing deferred this iteration goes out now so a
            // quiet queue cannot strand staged records.
            let staged = self.preparer.staged_records();
            if let Some(buffer) = self.preparer.flush_staged() {
                self.spawn_task(buffer, staged);
                self.submit_batch();
            }

            self.reap();
            self.sweep();

            if self.stop.load(Ordering::Acquire)
                && self.queue.is_empty()
                && self.tasks.is_empty()
            {
                break;
            }

            if self.queue.is_empty() {
                if self.tasks.is_empty() {
                    self.flush_signal.notify();
                    std::thread::sleep(IDLE_SLEEP);
                } else {
                    // Also flushes any still-unsubmitted entries: the
                    // bounded wait doubles as submit-and-wait.
                    self.ring.wait_completion(COMPLETION_WAIT);
                }
            }
        }

        self.flush_signal.notify();
        tracing::debug!("consumer loop exited");
    }

    /// Pop and prepare up to `max_per_iteration` records.
    fn drain_burst(&mut self) {
        let mut drained = 0;
        while drained < self.max_per_iteration {
            // Claim the work unit before the pop that may empty the queue;
            // see the module-level accounting note.
            self.active_work.fetch_add(1, Ordering::SeqCst);
            let Some(record) = self.queue.try_pop() else {
                self.release_work(1);
                break;
            };
            drained += 1;

            let staged_before = self.preparer.staged_records();
            let prepared = self.preparer.prepare(record);
            let staged_after = self.preparer.staged_records();
            let flush_now = prepared.flush_now;

            if let Some(buffer) = prepared.buffer {
                // Conservation: of the `staged_before + 1` records in
                // play, `staged_after` stayed behind in staging; the rest
                // ride this buffer (a record the preparer dropped and
                // reported is retired when the buffer completes).
                self.spawn_task(buffer, staged_before + 1 - staged_after);
            } else if staged_after == staged_before {
                // Dropped and reported by the preparer.
                self.release_work(1);
            }

            if flush_now || self.unsubmitted >= self.batch_size {
                self.submit_batch();
            }
        }
    }

    /// Rotate if due, mint a token, attempt submission, track the task.
    fn spawn_task(&mut self, buffer: Buffer, record_count: usize) {
        self.rotate_if_due();

        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);

        let mut task = WriteTask::new(token, buffer, record_count);
        if task.start(&mut self.ring, self.sink.raw_fd()) {
            self.unsubmitted += 1;
        }
        self.tasks.insert(token, task);
    }

    /// Rotation check made before each new write begins, never inside a
    /// completed task.
    fn rotate_if_due(&mut self) {
        if !self.rotater.should_rotate() {
            return;
        }
        if let Err(err) = self.rotater.rotate() {
            report(&self.reporter, &err.to_string());
            // Without the reset every subsequent write would retry the
            // rename; keep writing to the oversized file instead.
            self.rotater.reset();
            return;
        }
        if let Err(source) = self.sink.reopen(self.rotater.current_path()) {
            let err = RotateError::Reopen {
                path: self.rotater.current_path().to_path_buf(),
                source,
            };
            report(&self.reporter, &err.to_string());
        }
    }

    fn submit_batch(&mut self) {
        if self.ring.submit_pending() {
            self.unsubmitted = 0;
        } else {
            report(&self.reporter, "io_uring submission failed; ring marked non-operational");
        }
    }

    /// Harvest ready completions and resume their tasks.
    fn reap(&mut self) {
        for completion in self.ring.reap_completions() {
            match self.tasks.get_mut(&completion.token) {
                Some(task) => task.resume(completion.result),
                None => {
                    tracing::warn!(token = completion.token, "completion for unknown write task");
                }
            }
        }
    }

    /// Retire done tasks: recycle buffers, report errors, account bytes.
    #[allow(clippy::cast_sign_loss)]
    fn sweep(&mut self) {
        let done: Vec<u64> = self
            .tasks
            .iter()
            .filter_map(|(token, task)| task.is_done().then_some(*token))
            .collect();

        for token in done {
            let task = self.tasks.remove(&token).expect("done task disappeared");
            let result = task.result().expect("done task without result");
            let record_count = task.record_count();
            self.pool.release(task.into_buffer());

            if result < 0 {
                let err = io::Error::from_raw_os_error(-result);
                report(&self.reporter, &format!("asynchronous write failed: {err}"));
            } else {
                self.rotater.advance(result as u64);
            }

            self.release_work(record_count);
        }
    }

    /// Retire `count` units of claimed work, waking flushers at zero.
    fn release_work(&self, count: usize) {
        if count == 0 {
            return;
        }
        if self.active_work.fetch_sub(count, Ordering::SeqCst) == count {
            self.flush_signal.notify();
        }
    }

    /// Permanent ring failure: stop accepting work, discard what is queued
    /// or staged, abandon in-flight tasks, and report the damage once.
    fn abort_on_ring_failure(&mut self) {
        self.queue.shutdown();

        let mut dropped = 0usize;
        while self.queue.try_pop().is_some() {
            dropped += 1;
        }

        let mut stranded = self.preparer.staged_records();
        dropped += stranded;
        if let Some(buffer) = self.preparer.flush_staged() {
            self.pool.release(buffer);
        }

        let abandoned = self.tasks.len();
        for (_, task) in self.tasks.drain() {
            stranded += task.record_count();
            self.pool.release(task.into_buffer());
        }
        self.release_work(stranded);

        tracing::error!(dropped, abandoned, "ring non-operational, discarding queued records");
        report(
            &self.reporter,
            &format!(
                "io_uring failure: discarded {dropped} queued records, abandoned {abandoned} in-flight writes"
            ),
        );
        self.flush_signal.notify();
    }
}
