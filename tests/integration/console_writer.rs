//! Integration tests for the console writer

use evalhost::{AsyncWriter, ConsoleConfig};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sink that keeps every write call separately, so batches are visible
#[derive(Clone, Default)]
struct BatchSink {
    batches: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_next: Arc<Mutex<bool>>,
    delay: Option<Duration>,
}

impl BatchSink {
    fn batches(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .map(|b| String::from_utf8(b.clone()).unwrap())
            .collect()
    }

    fn text(&self) -> String {
        self.batches().concat()
    }
}

impl Write for BatchSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let mut fail = self.fail_next.lock();
        if *fail {
            *fail = false;
            return Err(io::Error::new(io::ErrorKind::Other, "sink unavailable"));
        }
        self.batches.lock().push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn config(batch_threshold: usize, time_slice_ms: u64) -> ConsoleConfig {
    ConsoleConfig {
        batch_threshold,
        time_slice_ms,
        shutdown_timeout_ms: 5_000,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_concurrent_producers_keep_their_order() {
    let sink = BatchSink::default();
    let writer = AsyncWriter::spawn(sink.clone(), &config(16, 2)).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let writer = writer.clone();
            std::thread::spawn(move || {
                for n in 0..200 {
                    writer.write_text(&format!("p{}-{}\n", p, n)).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    assert!(writer.close());

    let text = sink.text();
    let mut next = [0u32; 4];
    for line in text.lines() {
        let (producer, n) = line[1..].split_once('-').unwrap();
        let producer: usize = producer.parse().unwrap();
        let n: u32 = n.parse().unwrap();
        assert_eq!(n, next[producer], "producer {} out of order", producer);
        next[producer] += 1;
    }
    assert_eq!(next, [200; 4]);

    // A write is never split across two batches
    for batch in sink.batches() {
        assert!(batch.ends_with('\n'));
        assert!(batch.lines().all(|line| line.starts_with('p') && line.contains('-')));
    }
}

#[test]
fn test_writes_are_coalesced() {
    let sink = BatchSink::default();
    let writer = AsyncWriter::spawn(sink.clone(), &config(1_000, 60_000)).unwrap();

    for n in 0..50 {
        writer.write_text(&format!("{}\n", n)).unwrap();
    }
    assert_eq!(writer.pending(), 50);
    assert!(writer.close());

    assert_eq!(sink.batches().len(), 1);
    assert_eq!(sink.text().lines().count(), 50);
}

#[test]
fn test_flush_wakes_consumer_before_time_slice() {
    let sink = BatchSink::default();
    let writer = AsyncWriter::spawn(sink.clone(), &config(1_000, 60_000)).unwrap();

    writer.write_text("prompt> ").unwrap();
    writer.flush();
    assert!(wait_until(|| sink.text() == "prompt> "));
    assert_eq!(writer.pending(), 0);
}

#[test]
fn test_batch_threshold_wakes_consumer() {
    let sink = BatchSink::default();
    let writer = AsyncWriter::spawn(sink.clone(), &config(10, 60_000)).unwrap();

    for n in 0..10 {
        writer.write_text(&format!("{}", n)).unwrap();
    }
    assert!(wait_until(|| sink.text() == "0123456789"));
}

#[test]
fn test_time_slice_drains_without_flush() {
    let sink = BatchSink::default();
    let writer = AsyncWriter::spawn(sink.clone(), &config(1_000, 20)).unwrap();

    writer.write_text("tick").unwrap();
    assert!(wait_until(|| sink.text() == "tick"));
}

#[test]
fn test_write_after_close_is_broken_pipe() {
    let sink = BatchSink::default();
    let writer = AsyncWriter::spawn(sink.clone(), &config(100, 20)).unwrap();
    writer.write_text("last words\n").unwrap();
    assert!(writer.close());
    assert!(writer.is_closed());

    let err = writer.write_text("too late\n").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(sink.text(), "last words\n");

    // Closing twice is harmless
    assert!(writer.close());
}

#[test]
fn test_close_is_bounded_by_shutdown_timeout() {
    let sink = BatchSink {
        delay: Some(Duration::from_millis(500)),
        ..BatchSink::default()
    };
    let writer = AsyncWriter::spawn(
        sink,
        &ConsoleConfig {
            batch_threshold: 1_000,
            time_slice_ms: 60_000,
            shutdown_timeout_ms: 50,
        },
    )
    .unwrap();

    writer.write_text("slow sink\n").unwrap();
    let started = Instant::now();
    assert!(!writer.close());
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[test]
fn test_sink_error_does_not_stop_consumer() {
    let sink = BatchSink::default();
    *sink.fail_next.lock() = true;
    let writer = AsyncWriter::spawn(sink.clone(), &config(1_000, 60_000)).unwrap();

    writer.write_text("lost\n").unwrap();
    writer.flush();
    assert!(wait_until(|| !*sink.fail_next.lock()));

    writer.write_text("kept\n").unwrap();
    writer.flush();
    assert!(wait_until(|| sink.text() == "kept\n"));
}

#[test]
fn test_io_write_impl_enqueues() {
    let sink = BatchSink::default();
    let mut writer = AsyncWriter::spawn(sink.clone(), &config(100, 20)).unwrap();

    write!(writer, "{} + {} = {}", 1, 2, 3).unwrap();
    Write::flush(&mut writer).unwrap();
    assert!(wait_until(|| sink.text() == "1 + 2 = 3"));
}
