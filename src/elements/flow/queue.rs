//! Bounded queue between chain segments.
//!
//! The queue is the only place a producing stage may wait on a consuming
//! one. It is bounded both by buffer count and by bytes, and the byte ceiling
//! is strict: the queued byte total never exceeds it.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::pipeline::config::QueueConfig;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A bounded buffer queue shared by one producer segment and one consumer segment.
///
/// Cloning yields another handle to the same queue.
///
/// ```rust
/// use visionpipe::buffer::Buffer;
/// use visionpipe::elements::Queue;
/// use visionpipe::metadata::Metadata;
/// use visionpipe::pipeline::config::QueueConfig;
///
/// let queue = Queue::new(QueueConfig::default().max_bytes(1024));
/// queue.push(Buffer::new(vec![0u8; 512], Metadata::new())).unwrap();
/// assert_eq!(queue.current_bytes(), 512);
/// assert!(queue.pop().is_some());
/// ```
#[derive(Clone)]
pub struct Queue {
    name: String,
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    config: QueueConfig,
}

#[derive(Default)]
struct QueueState {
    buffers: VecDeque<Buffer>,
    current_bytes: usize,
    peak_bytes: usize,
    total_pushed: u64,
    total_popped: u64,
    total_dropped: u64,
    flushing: bool,
    eos: bool,
}

/// What happens when a push would exceed a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeakyMode {
    /// Block the producer until space is available (default).
    #[default]
    None,
    /// Drop the incoming buffer.
    Upstream,
    /// Drop the oldest queued buffers until the new one fits.
    Downstream,
}

/// Statistics about queue operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Buffers currently queued.
    pub current_buffers: usize,
    /// Bytes currently queued.
    pub current_bytes: usize,
    /// Highest byte total ever queued at once.
    pub peak_bytes: usize,
    /// Buffers accepted.
    pub total_pushed: u64,
    /// Buffers handed to the consumer.
    pub total_popped: u64,
    /// Buffers discarded by the leaky policy.
    pub total_dropped: u64,
}

impl QueueState {
    fn fits(&self, incoming: usize, config: &QueueConfig) -> bool {
        self.buffers.len() < config.max_buffers.max(1)
            && self.current_bytes + incoming <= config.max_bytes
    }

    fn pop_front(&mut self) -> Option<Buffer> {
        let buffer = self.buffers.pop_front()?;
        self.current_bytes -= buffer.len();
        Some(buffer)
    }
}

impl Queue {
    /// Create a queue from its configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            name: format!("queue-{}B", config.max_bytes),
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    buffers: VecDeque::with_capacity(config.max_buffers.min(1024)),
                    ..Default::default()
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                config,
            }),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Limits this queue was created with.
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffers currently queued.
    pub fn len(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently queued.
    pub fn current_bytes(&self) -> usize {
        self.lock().current_bytes
    }

    /// Whether the queue is flushing.
    pub fn is_flushing(&self) -> bool {
        self.lock().flushing
    }

    /// Whether end-of-stream was signalled.
    pub fn is_eos(&self) -> bool {
        self.lock().eos
    }

    /// Get statistics about the queue.
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            current_buffers: state.buffers.len(),
            current_bytes: state.current_bytes,
            peak_bytes: state.peak_bytes,
            total_pushed: state.total_pushed,
            total_popped: state.total_popped,
            total_dropped: state.total_dropped,
        }
    }

    /// Enter or leave flushing. Entering discards queued buffers and wakes
    /// every blocked producer and consumer.
    pub fn set_flushing(&self, flushing: bool) {
        let mut state = self.lock();
        state.flushing = flushing;
        if flushing {
            state.buffers.clear();
            state.current_bytes = 0;
            self.inner.not_empty.notify_all();
            self.inner.not_full.notify_all();
        }
    }

    /// Mark the end of the stream. Queued buffers can still be popped.
    pub fn end_of_stream(&self) {
        self.lock().eos = true;
        self.inner.not_empty.notify_all();
    }

    /// Push a buffer, waiting for space as long as it takes.
    pub fn push(&self, buffer: Buffer) -> Result<()> {
        self.push_timeout(buffer, None)
    }

    /// Push a buffer, waiting at most `timeout` for space.
    ///
    /// A buffer larger than the whole byte ceiling can never fit and is
    /// refused.
    pub fn push_timeout(&self, buffer: Buffer, timeout: Option<Duration>) -> Result<()> {
        let config = &self.inner.config;
        let incoming = buffer.len();
        if incoming > config.max_bytes {
            return Err(Error::Element(format!(
                "{}: {incoming} byte buffer exceeds the {} byte ceiling",
                self.name, config.max_bytes
            )));
        }

        // One deadline for the whole call, however many wakeups it takes.
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            if state.flushing {
                return Err(Error::Element(format!("{} is flushing", self.name)));
            }
            if state.eos {
                return Err(Error::Element(format!("{} received data after end-of-stream", self.name)));
            }
            if state.fits(incoming, config) {
                break;
            }
            match config.leaky {
                LeakyMode::None => {
                    state = match deadline {
                        Some(deadline) => {
                            let remaining = deadline.saturating_duration_since(Instant::now());
                            if remaining.is_zero() {
                                return Err(Error::Element(format!("{} push timed out", self.name)));
                            }
                            self.inner
                                .not_full
                                .wait_timeout(state, remaining)
                                .unwrap_or_else(PoisonError::into_inner)
                                .0
                        }
                        None => self
                            .inner
                            .not_full
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner),
                    };
                }
                LeakyMode::Upstream => {
                    state.total_dropped += 1;
                    return Ok(());
                }
                LeakyMode::Downstream => {
                    if state.pop_front().is_some() {
                        state.total_dropped += 1;
                    }
                }
            }
        }

        state.buffers.push_back(buffer);
        state.current_bytes += incoming;
        state.peak_bytes = state.peak_bytes.max(state.current_bytes);
        state.total_pushed += 1;
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Pop a buffer, waiting until one arrives.
    ///
    /// Returns `None` once the queue is flushing, or at end-of-stream after
    /// the last buffer has been taken.
    pub fn pop(&self) -> Option<Buffer> {
        self.pop_timeout(None)
    }

    /// Pop a buffer, waiting at most `timeout`.
    pub fn pop_timeout(&self, timeout: Option<Duration>) -> Option<Buffer> {
        let mut state = self.lock();
        while state.buffers.is_empty() && !state.flushing && !state.eos {
            state = match timeout {
                Some(t) => {
                    let (s, result) = self
                        .inner
                        .not_empty
                        .wait_timeout(state, t)
                        .unwrap_or_else(PoisonError::into_inner);
                    if result.timed_out() && s.buffers.is_empty() {
                        return None;
                    }
                    s
                }
                None => self
                    .inner
                    .not_empty
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        if state.flushing {
            return None;
        }

        let buffer = state.pop_front()?;
        state.total_popped += 1;
        self.inner.not_full.notify_one();
        Some(buffer)
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use std::thread;

    fn buf(size: usize, seq: u64) -> Buffer {
        Buffer::new(vec![0u8; size], Metadata::with_sequence(seq))
    }

    fn limits(max_buffers: usize, max_bytes: usize) -> QueueConfig {
        QueueConfig::default()
            .max_buffers(max_buffers)
            .max_bytes(max_bytes)
    }

    #[test]
    fn test_fifo_order() {
        let queue = Queue::new(limits(10, 1000));
        for i in 0..5 {
            queue.push(buf(10, i)).unwrap();
        }
        for i in 0..5 {
            assert_eq!(queue.pop().unwrap().metadata().sequence, i);
        }
        assert_eq!(queue.stats().total_popped, 5);
    }

    #[test]
    fn test_byte_ceiling_is_strict() {
        let queue = Queue::new(limits(100, 100));
        queue.push(buf(60, 0)).unwrap();
        let err = queue
            .push_timeout(buf(60, 1), Some(Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(err, Error::Element(_)));
        assert_eq!(queue.current_bytes(), 60);
        queue.push(buf(40, 2)).unwrap();
        assert_eq!(queue.stats().peak_bytes, 100);
    }

    #[test]
    fn test_oversize_buffer_refused() {
        let queue = Queue::new(limits(100, 100));
        assert!(queue.push(buf(101, 0)).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_leaky_upstream_drops_new() {
        let queue = Queue::new(limits(2, 1000).leaky(LeakyMode::Upstream));
        for i in 0..4 {
            queue.push(buf(10, i)).unwrap();
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.stats().total_dropped, 2);
        assert_eq!(queue.pop().unwrap().metadata().sequence, 0);
    }

    #[test]
    fn test_leaky_downstream_drops_old() {
        let queue = Queue::new(limits(10, 100).leaky(LeakyMode::Downstream));
        queue.push(buf(50, 0)).unwrap();
        queue.push(buf(50, 1)).unwrap();
        queue.push(buf(80, 2)).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current_bytes(), 80);
        assert_eq!(queue.stats().total_dropped, 2);
        assert_eq!(queue.pop().unwrap().metadata().sequence, 2);
    }

    #[test]
    fn test_eos_drains_then_ends() {
        let queue = Queue::new(limits(10, 1000));
        queue.push(buf(1, 0)).unwrap();
        queue.end_of_stream();
        assert!(queue.push(buf(1, 1)).is_err());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
        assert!(queue.is_eos());
    }

    #[test]
    fn test_flushing_wakes_blocked_producer() {
        let queue = Queue::new(limits(1, 1000));
        queue.push(buf(1, 0)).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(buf(1, 1)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.set_flushing(true);

        assert!(producer.join().unwrap().is_err());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_push_timeout_holds_across_wakeups() {
        let queue = Queue::new(limits(10, 100));
        queue.push(buf(100, 0)).unwrap();

        // Keeps freeing and refilling the queue, waking the producer each time.
        let churn = {
            let queue = queue.clone();
            thread::spawn(move || {
                let until = Instant::now() + Duration::from_millis(600);
                while Instant::now() < until {
                    if queue.pop_timeout(Some(Duration::from_millis(5))).is_some() {
                        let _ = queue.push_timeout(buf(100, 1), Some(Duration::from_millis(5)));
                    }
                    thread::sleep(Duration::from_millis(20));
                }
            })
        };

        let started = Instant::now();
        let _ = queue.push_timeout(buf(60, 2), Some(Duration::from_millis(100)));
        let waited = started.elapsed();
        churn.join().unwrap();
        assert!(waited < Duration::from_millis(400), "held for {waited:?}");
    }

    #[test]
    fn test_pop_timeout() {
        let queue = Queue::new(limits(10, 1000));
        assert!(queue.pop_timeout(Some(Duration::from_millis(10))).is_none());
    }

    #[test]
    fn test_producer_consumer() {
        let queue = Queue::new(limits(4, 4096));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    queue.push(buf(512, i)).unwrap();
                }
                queue.end_of_stream();
            })
        };
        let mut seen = 0;
        while let Some(b) = queue.pop() {
            assert_eq!(b.metadata().sequence, seen);
            seen += 1;
        }
        producer.join().unwrap();
        assert_eq!(seen, 100);
        assert!(queue.stats().peak_bytes <= 4096);
    }
}
