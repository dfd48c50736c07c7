//! Ingress: inject encoded buffers from application code.

use crate::buffer::Buffer;
use crate::elements::flow::{Queue, QueueStats};
use crate::error::{Error, Result};
use crate::format::Caps;
use crate::metadata::Metadata;
use crate::observability::record_injected;
use crate::pipeline::config::{QueueConfig, SourceConfig};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// The head of a chain: application threads inject buffers, the first chain
/// segment pulls them.
///
/// Cloning yields another handle to the same source, so any number of
/// producer threads may inject.
///
/// Every injected buffer is stamped with the configured fixed chunk duration
/// (not derived from its size), a running sequence number, and, with
/// `do_timestamp`, the running time since the first injection.
///
/// # Example
///
/// ```rust
/// use visionpipe::elements::AppSrc;
/// use visionpipe::pipeline::config::SourceConfig;
/// use std::time::Duration;
///
/// let src = AppSrc::new("track-1", SourceConfig::default());
/// src.inject(vec![0u8; 1200]).unwrap();
/// src.end_of_stream();
///
/// let buf = src.queue().pop().unwrap();
/// assert_eq!(buf.metadata().duration, Some(Duration::from_millis(1)));
/// assert!(src.queue().pop().is_none());
/// ```
#[derive(Clone)]
pub struct AppSrc {
    inner: Arc<AppSrcInner>,
}

struct AppSrcInner {
    track: Arc<str>,
    config: SourceConfig,
    queue: Queue,
    started: OnceLock<Instant>,
    sequence: AtomicU64,
}

impl AppSrc {
    /// Create the ingress for `track`.
    pub fn new(track: impl Into<Arc<str>>, config: SourceConfig) -> Self {
        let track = track.into();
        let queue = Queue::new(
            QueueConfig::default()
                .max_bytes(config.max_bytes)
                .max_buffers(config.max_buffers),
        )
        .with_name(format!("{track}:appsrc"));
        Self {
            inner: Arc::new(AppSrcInner {
                track,
                config,
                queue,
                started: OnceLock::new(),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    /// Track this source feeds.
    pub fn track_id(&self) -> &str {
        &self.inner.track
    }

    /// Source configuration.
    pub fn config(&self) -> &SourceConfig {
        &self.inner.config
    }

    /// What the source produces.
    pub fn caps(&self) -> Caps {
        Caps::Rtp(self.inner.config.caps.clone())
    }

    /// Inject one encoded chunk, taking ownership of it.
    ///
    /// Waits at most the configured block timeout for queue space. Fails
    /// after [`end_of_stream`](Self::end_of_stream), while flushing, or when
    /// the wait times out.
    pub fn inject(&self, data: Vec<u8>) -> Result<()> {
        self.inject_bytes(Bytes::from(data))
    }

    /// Inject a copy of `data`; the caller keeps its buffer.
    pub fn inject_slice(&self, data: &[u8]) -> Result<()> {
        self.inject_bytes(Bytes::copy_from_slice(data))
    }

    fn inject_bytes(&self, data: Bytes) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidFrame(format!(
                "{}: empty buffer injected",
                self.inner.track
            )));
        }
        let mut metadata = Metadata::new().with_duration(self.inner.config.chunk_duration);
        if self.inner.config.do_timestamp {
            let started = *self.inner.started.get_or_init(Instant::now);
            metadata = metadata.with_pts(started.elapsed());
        }
        self.push_buffer(Buffer::new(data, metadata))
    }

    /// Push a prepared buffer. Only the sequence number is assigned.
    pub fn push_buffer(&self, mut buffer: Buffer) -> Result<()> {
        let len = buffer.len();
        buffer.metadata_mut().sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        self.inner
            .queue
            .push_timeout(buffer, self.inner.config.block_timeout)?;
        record_injected(&self.inner.track, len);
        Ok(())
    }

    /// No more buffers will be injected; the chain drains and finishes.
    pub fn end_of_stream(&self) {
        tracing::debug!(track = %self.inner.track, "ingress end-of-stream");
        self.inner.queue.end_of_stream();
    }

    /// Refuse new buffers and wake blocked producers.
    pub fn set_flushing(&self, flushing: bool) {
        self.inner.queue.set_flushing(flushing);
    }

    /// Check if end-of-stream has been signaled.
    pub fn is_eos(&self) -> bool {
        self.inner.queue.is_eos()
    }

    /// Ingress queue statistics.
    pub fn stats(&self) -> QueueStats {
        self.inner.queue.stats()
    }

    /// The queue the first chain segment pulls from.
    pub fn queue(&self) -> &Queue {
        &self.inner.queue
    }
}

impl std::fmt::Debug for AppSrc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSrc")
            .field("track", &self.inner.track)
            .field("queued", &self.inner.queue.len())
            .finish()
    }
}
