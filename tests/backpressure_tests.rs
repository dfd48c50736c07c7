//! Integration tests for backpressure and flow control.
//!
//! These tests verify that:
//! - A queue never holds more bytes than its ceiling, whatever the rate mismatch
//! - Leaky queues drop instead of blocking, still within the ceiling
//! - The ingress bounds how long an injecting thread can be held up

use std::thread;
use std::time::{Duration, Instant};
use visionpipe::buffer::Buffer;
use visionpipe::elements::{AppSrc, LeakyMode, Queue};
use visionpipe::metadata::Metadata;
use visionpipe::pipeline::config::{QueueConfig, SourceConfig};

const CEILING: usize = 16 * 1024;

/// Deterministic sizes between 100 and 4000 bytes.
fn sizes(count: usize) -> Vec<usize> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            100 + (state % 3900) as usize
        })
        .collect()
}

fn buffer(len: usize, seq: u64) -> Buffer {
    Buffer::new(vec![(seq & 0xff) as u8; len], Metadata::with_sequence(seq))
}

/// Fast producer, slow consumer.
fn run_mismatch(queue: Queue, count: usize) -> (u64, u64) {
    let producer_queue = queue.clone();
    let producer = thread::spawn(move || {
        let mut accepted = 0u64;
        for (seq, len) in sizes(count).into_iter().enumerate() {
            if producer_queue.push(buffer(len, seq as u64)).is_ok() {
                accepted += 1;
            }
            assert!(producer_queue.current_bytes() <= CEILING);
        }
        producer_queue.end_of_stream();
        accepted
    });

    let mut popped = 0u64;
    while let Some(buf) = queue.pop() {
        assert!(queue.current_bytes() <= CEILING);
        assert!(!buf.is_empty());
        popped += 1;
        if popped % 8 == 0 {
            thread::sleep(Duration::from_micros(200));
        }
    }
    (producer.join().unwrap(), popped)
}

#[test]
fn test_blocking_queue_never_exceeds_ceiling() {
    let queue = Queue::new(QueueConfig::default().max_bytes(CEILING).max_buffers(1000));
    let (accepted, popped) = run_mismatch(queue.clone(), 400);

    assert_eq!(accepted, 400);
    assert_eq!(popped, 400);
    let stats = queue.stats();
    assert!(stats.peak_bytes <= CEILING, "peak {} over ceiling", stats.peak_bytes);
    assert!(stats.peak_bytes > CEILING / 2, "producer never got ahead");
    assert_eq!(stats.total_dropped, 0);
    assert_eq!(stats.current_bytes, 0);
}

#[test]
fn test_leaky_queues_drop_within_ceiling() {
    for leaky in [LeakyMode::Upstream, LeakyMode::Downstream] {
        let queue = Queue::new(
            QueueConfig::default()
                .max_bytes(CEILING)
                .max_buffers(1000)
                .leaky(leaky),
        );
        let (accepted, popped) = run_mismatch(queue.clone(), 400);

        let stats = queue.stats();
        assert!(stats.peak_bytes <= CEILING, "{leaky:?}: peak {}", stats.peak_bytes);
        // Leaky pushes never fail; what is not popped was dropped.
        assert_eq!(accepted, 400);
        assert_eq!(popped + stats.total_dropped, 400, "{leaky:?}");
    }
}

#[test]
fn test_buffer_count_ceiling() {
    let queue = Queue::new(QueueConfig::default().max_buffers(4));
    for seq in 0..4 {
        queue.push(buffer(10, seq)).unwrap();
    }
    assert!(
        queue
            .push_timeout(buffer(10, 4), Some(Duration::from_millis(20)))
            .is_err()
    );
    assert_eq!(queue.len(), 4);
}

#[test]
fn test_oversize_buffer_refused() {
    let queue = Queue::new(QueueConfig::default().max_bytes(1024));
    assert!(queue.push(buffer(1025, 0)).is_err());
    assert_eq!(queue.stats().total_pushed, 0);
    assert!(queue.push(buffer(1024, 1)).is_ok());
}

#[test]
fn test_ingress_wait_is_bounded() {
    let config = SourceConfig {
        max_bytes: 4096,
        block_timeout: Some(Duration::from_millis(50)),
        ..SourceConfig::default()
    };
    let src = AppSrc::new("t", config);
    src.inject(vec![0u8; 4096]).unwrap();

    let started = Instant::now();
    assert!(src.inject(vec![0u8; 1200]).is_err());
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(40), "gave up after {waited:?}");
    assert!(waited < Duration::from_secs(2), "held for {waited:?}");
    assert_eq!(src.stats().current_bytes, 4096);
}

#[test]
fn test_flushing_releases_blocked_producer() {
    let queue = Queue::new(QueueConfig::default().max_bytes(1024));
    queue.push(buffer(1024, 0)).unwrap();

    let blocked = queue.clone();
    let producer = thread::spawn(move || blocked.push(buffer(512, 1)));
    thread::sleep(Duration::from_millis(20));
    queue.set_flushing(true);

    assert!(producer.join().unwrap().is_err());
    assert!(queue.pop().is_none());
    assert_eq!(queue.current_bytes(), 0);
}
