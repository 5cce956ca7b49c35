//! Thread-safe console writer
//!
//! Many producers, one sink. Writes are queued as immutable chunks and a single
//! consumer thread drains the queue in arrival order, batching writes so the sink
//! is not flushed once per call. Producers never wait on the sink.
//!
//! Delivery is at most once: a batch the sink rejects is dropped, not retried.
//! A failing sink is reported when it starts failing and again when it recovers.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

/// Console writer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Pending writes that wake the consumer before its time slice ends
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,

    /// Longest time a write waits in the queue (milliseconds)
    #[serde(default = "default_time_slice_ms")]
    pub time_slice_ms: u64,

    /// Upper bound on how long `close` waits for the final drain (milliseconds)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_batch_threshold() -> usize {
    100
}

fn default_time_slice_ms() -> u64 {
    20
}

fn default_shutdown_timeout_ms() -> u64 {
    1000
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            batch_threshold: default_batch_threshold(),
            time_slice_ms: default_time_slice_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl ConsoleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_threshold == 0 {
            return Err("batch_threshold must be at least 1".to_string());
        }
        if self.time_slice_ms == 0 {
            return Err("time_slice_ms must be at least 1".to_string());
        }
        Ok(())
    }
}

struct Chunk {
    seq: u64,
    bytes: Box<[u8]>,
}

#[derive(Default)]
struct Pending {
    chunks: VecDeque<Chunk>,
    next_seq: u64,
    /// Writes since the consumer last woke up
    signals: usize,
    flush_requested: bool,
    closed: bool,
}

struct Shared {
    pending: Mutex<Pending>,
    wake: Condvar,
    batch_threshold: usize,
    time_slice: Duration,
}

impl Shared {
    /// Block the consumer until there is a reason to drain, then take everything.
    fn next_batch(&self) -> (Vec<Chunk>, bool) {
        let mut pending = self.pending.lock();
        let deadline = Instant::now() + self.time_slice;
        while !pending.closed && !pending.flush_requested && pending.signals < self.batch_threshold {
            if self.wake.wait_until(&mut pending, deadline).timed_out() {
                break;
            }
        }
        pending.signals = 0;
        pending.flush_requested = false;
        let closing = pending.closed;
        (pending.chunks.drain(..).collect(), closing)
    }

    fn close(&self) {
        self.pending.lock().closed = true;
        self.wake.notify_all();
    }
}

struct Inner {
    shared: Arc<Shared>,
    done: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown_timeout: Duration,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last handle gone: let the consumer drain and exit on its own.
        self.shared.close();
    }
}

/// Non-blocking, coalescing writer in front of a single sink
#[derive(Clone)]
pub struct AsyncWriter {
    inner: Arc<Inner>,
}

impl AsyncWriter {
    /// Start the consumer thread for `sink`.
    pub fn spawn<W>(sink: W, config: &ConsoleConfig) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending::default()),
            wake: Condvar::new(),
            batch_threshold: config.batch_threshold.max(1),
            time_slice: Duration::from_millis(config.time_slice_ms.max(1)),
        });
        let (done_tx, done_rx) = mpsc::channel();

        let consumer = Arc::clone(&shared);
        thread::Builder::new()
            .name("Thread safe console writer".to_string())
            .spawn(move || run_consumer(consumer, sink, done_tx))?;

        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                done: Mutex::new(Some(done_rx)),
                shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            }),
        })
    }

    /// Writer in front of the process's standard error stream
    pub fn stderr(config: &ConsoleConfig) -> io::Result<Self> {
        Self::spawn(io::stderr(), config)
    }

    pub fn write_text(&self, text: &str) -> io::Result<()> {
        self.write_bytes(text.as_bytes())
    }

    /// Queue one chunk. Never waits on the sink.
    pub fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let shared = &self.inner.shared;
        let mut pending = shared.pending.lock();
        if pending.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "console writer is closed",
            ));
        }
        let seq = pending.next_seq;
        pending.next_seq += 1;
        pending.chunks.push_back(Chunk {
            seq,
            bytes: bytes.into(),
        });
        pending.signals += 1;
        let wake = pending.signals >= shared.batch_threshold;
        drop(pending);

        if wake {
            shared.wake.notify_one();
        }
        Ok(())
    }

    /// Ask the consumer to drain now rather than at the end of its time slice.
    /// Does not wait for the sink.
    pub fn flush(&self) {
        let shared = &self.inner.shared;
        shared.pending.lock().flush_requested = true;
        shared.wake.notify_one();
    }

    /// Chunks queued but not yet handed to the sink
    pub fn pending(&self) -> usize {
        self.inner.shared.pending.lock().chunks.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shared.pending.lock().closed
    }

    /// Stop accepting writes and wait, up to the configured shutdown timeout, for
    /// the queue to be drained into the sink.
    ///
    /// Returns false if the sink did not finish in time.
    pub fn close(&self) -> bool {
        self.inner.shared.close();
        let done = self.inner.done.lock().take();
        let Some(done) = done else {
            return true;
        };
        match done.recv_timeout(self.inner.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.inner.shutdown_timeout.as_millis() as u64,
                    "Console sink did not drain before shutdown timeout"
                );
                false
            }
        }
    }
}

impl Write for AsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        AsyncWriter::flush(self);
        Ok(())
    }
}

impl fmt::Debug for AsyncWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncWriter")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn run_consumer<W: Write>(shared: Arc<Shared>, mut sink: W, done: mpsc::Sender<()>) {
    let mut health = SinkHealth::default();
    loop {
        let (batch, closing) = shared.next_batch();
        if !batch.is_empty() {
            let bytes: usize = batch.iter().map(|chunk| chunk.bytes.len()).sum();
            match write_batch(&mut sink, &batch) {
                Ok(()) => {
                    if let Some((batches, dropped)) = health.recovered() {
                        info!(
                            dropped_batches = batches,
                            dropped_bytes = dropped,
                            "Console sink recovered"
                        );
                    }
                }
                Err(err) => {
                    if health.failed(bytes) {
                        warn!(
                            error = %err,
                            bytes,
                            "Console sink write failed, dropping output until it recovers"
                        );
                    }
                }
            }
        }
        if closing {
            break;
        }
    }
    if let Err(err) = sink.flush() {
        warn!(error = %err, "Console sink flush failed during shutdown");
    }
    let _ = done.send(());
}

/// Consecutive sink failures, so a broken sink is reported once per outage.
#[derive(Debug, Default)]
struct SinkHealth {
    failed_batches: u64,
    dropped_bytes: u64,
}

impl SinkHealth {
    /// Record a dropped batch. True when it starts a new outage.
    fn failed(&mut self, bytes: usize) -> bool {
        self.failed_batches += 1;
        self.dropped_bytes += bytes as u64;
        self.failed_batches == 1
    }

    /// End the current outage, returning what it dropped.
    fn recovered(&mut self) -> Option<(u64, u64)> {
        if self.failed_batches == 0 {
            return None;
        }
        let dropped = (self.failed_batches, self.dropped_bytes);
        *self = Self::default();
        Some(dropped)
    }
}

/// One write and one flush per batch; a chunk is never split across batches.
fn write_batch<W: Write>(sink: &mut W, batch: &[Chunk]) -> io::Result<()> {
    let total: usize = batch.iter().map(|chunk| chunk.bytes.len()).sum();
    let mut buffer = Vec::with_capacity(total);
    for chunk in batch {
        buffer.extend_from_slice(&chunk.bytes);
    }

    let first_seq = batch.first().map(|chunk| chunk.seq);
    let last_seq = batch.last().map(|chunk| chunk.seq);
    trace!(?first_seq, ?last_seq, bytes = total, "Writing console batch");

    sink.write_all(&buffer)?;
    sink.flush()
}
