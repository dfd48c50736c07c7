//! Egress: hand finished encoded samples to application code.
//!
//! The sink copies each sample out of the chain (`extract-and-duplicate`) and
//! offers it to a bounded `kanal` channel. With `drop=true` a full channel
//! drops the sample and bumps a counter instead of stalling the worker.
//! With `drop=false` the worker waits for room, and `sync=true` paces to
//! the stream's pts; both waits end as soon as the chain starts flushing.

use crate::buffer::Buffer;
use crate::element::{Element, Output};
use crate::error::{Error, Result};
use crate::observability::{record_sample_dropped, record_sample_emitted};
use crate::pipeline::config::SinkConfig;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Retry interval while a blocking sink waits for channel room.
const SEND_RETRY: Duration = Duration::from_millis(2);

/// One finished encoded sample, owned by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSample {
    /// Track the sample belongs to.
    pub track_id: Arc<str>,
    /// Sample bytes (an owned copy).
    pub data: Bytes,
    /// Sample duration.
    pub duration: Duration,
    /// Presentation timestamp, when known.
    pub pts: Option<Duration>,
}

impl EncodedSample {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Duration in nanoseconds, the time unit handed to sample callbacks.
    pub fn duration_ticks(&self) -> u64 {
        u64::try_from(self.duration.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Sample counters shared by a sink and its receiver.
#[derive(Debug, Default)]
struct SinkCounters {
    emitted: AtomicU64,
    dropped: AtomicU64,
}

/// Flushing flag shared between a sink and the chain that owns it.
///
/// The sink's waits (channel room, `sync` pacing) sleep on it, so setting it
/// wakes a parked worker right away.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlushSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl FlushSignal {
    pub(crate) fn set_flushing(&self, flushing: bool) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = flushing;
        cvar.notify_all();
    }

    pub(crate) fn is_flushing(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep until `deadline`. Returns `true` if flushing cut the wait short.
    fn wait_until(&self, deadline: Instant) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut flushing = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if *flushing {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            flushing = cvar
                .wait_timeout(flushing, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Terminal stage of a chain.
pub struct AppSink {
    name: String,
    track: Arc<str>,
    config: SinkConfig,
    sender: Option<kanal::Sender<EncodedSample>>,
    counters: Arc<SinkCounters>,
    flush: FlushSignal,
    /// Wall-clock anchor for `sync` pacing.
    clock_base: Option<(Instant, Duration)>,
}

impl AppSink {
    /// Create a sink for `track` and the receiver its samples arrive on.
    pub fn new(track: impl Into<Arc<str>>, config: SinkConfig) -> (Self, SampleReceiver) {
        let track = track.into();
        let (tx, rx) = kanal::bounded(config.max_buffers.max(1));
        let counters = Arc::new(SinkCounters::default());
        let sink = Self {
            name: "appsink".to_string(),
            track: Arc::clone(&track),
            config,
            sender: Some(tx),
            counters: Arc::clone(&counters),
            flush: FlushSignal::default(),
            clock_base: None,
        };
        let receiver = SampleReceiver {
            track,
            inner: rx,
            counters,
        };
        (sink, receiver)
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Samples dropped so far.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Handle the owning chain sets when it tears down.
    pub(crate) fn flush_signal(&self) -> FlushSignal {
        self.flush.clone()
    }

    fn flushing_error(&self) -> Error {
        Error::Element(format!("{}: flushing", self.name))
    }

    /// Wait until `pts` is due on the wall clock. `false` if flushing interrupted.
    fn wait_for(&mut self, pts: Duration) -> bool {
        let (anchor, base_pts) = *self.clock_base.get_or_insert((Instant::now(), pts));
        let due = anchor + pts.saturating_sub(base_pts);
        !self.flush.wait_until(due)
    }

    fn count_drop(&self) {
        let total = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        record_sample_dropped(&self.track);
        tracing::debug!(track = %self.track, dropped = total, "egress full, sample dropped");
    }
}

impl Element for AppSink {
    fn process(&mut self, buffer: Buffer) -> Result<Output> {
        let on_time = match (self.config.sync, buffer.metadata().pts) {
            (true, Some(pts)) => self.wait_for(pts),
            _ => true,
        };
        if !on_time {
            return Err(self.flushing_error());
        }

        let Some(sender) = &self.sender else {
            return Err(Error::InvalidState(format!(
                "{}: sample after end-of-stream",
                self.name
            )));
        };

        let metadata = buffer.metadata();
        let sample = EncodedSample {
            track_id: Arc::clone(&self.track),
            data: Bytes::copy_from_slice(buffer.as_bytes()),
            duration: metadata.duration.unwrap_or_default(),
            pts: metadata.pts,
        };

        if self.config.drop {
            match sender.try_send(sample) {
                Ok(true) => {}
                // Full, or the consumer went away: the sample is lost either way.
                Ok(false) | Err(_) => {
                    self.count_drop();
                    return Ok(Output::None);
                }
            }
        } else {
            // A full channel parks the worker, but never past a flush.
            loop {
                if self.flush.is_flushing() {
                    return Err(self.flushing_error());
                }
                match sender.try_send(sample.clone()) {
                    Ok(true) => break,
                    Ok(false) => {
                        self.flush.wait_until(Instant::now() + SEND_RETRY);
                    }
                    Err(_) => {
                        return Err(Error::Element(format!(
                            "{}: consumer disconnected",
                            self.name
                        )));
                    }
                }
            }
        }
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);
        record_sample_emitted(&self.track);
        Ok(Output::None)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn end_of_stream(&mut self) -> Result<Output> {
        tracing::debug!(track = %self.track, "egress closed");
        self.sender = None;
        Ok(Output::None)
    }

    fn release(&mut self) {
        self.sender = None;
    }
}

/// Consumer end of a track's egress.
pub struct SampleReceiver {
    track: Arc<str>,
    inner: kanal::Receiver<EncodedSample>,
    counters: Arc<SinkCounters>,
}

impl SampleReceiver {
    /// Track this receiver belongs to.
    pub fn track_id(&self) -> &str {
        &self.track
    }

    /// Wait for the next sample. `None` once the sink closed and all
    /// samples were taken.
    pub fn recv(&self) -> Option<EncodedSample> {
        self.inner.recv().ok()
    }

    /// Wait at most `timeout` for the next sample.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<EncodedSample> {
        self.inner.recv_timeout(timeout).ok()
    }

    /// Take a sample if one is ready.
    pub fn try_recv(&self) -> Option<EncodedSample> {
        match self.inner.try_recv() {
            Ok(Some(sample)) => Some(sample),
            _ => None,
        }
    }

    /// Samples queued for the consumer.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if no sample is waiting.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Samples the sink handed over so far.
    pub fn emitted(&self) -> u64 {
        self.counters.emitted.load(Ordering::Relaxed)
    }

    /// Samples the sink dropped so far.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Call `on_sample(track_id, bytes, len, duration_ticks)` for every
    /// sample on a dedicated thread, until the sink closes.
    ///
    /// The callback runs off the chain's workers, so a slow consumer only
    /// causes drops at the sink, never a stalled chain.
    pub fn forward<F>(self, mut on_sample: F) -> Result<JoinHandle<u64>>
    where
        F: FnMut(&str, &[u8], usize, u64) + Send + 'static,
    {
        let name = format!("{}-egress", self.track);
        let handle = thread::Builder::new().name(name).spawn(move || {
            let mut forwarded = 0u64;
            while let Some(sample) = self.recv() {
                on_sample(
                    &sample.track_id,
                    &sample.data,
                    sample.len(),
                    sample.duration_ticks(),
                );
                forwarded += 1;
            }
            forwarded
        })?;
        Ok(handle)
    }
}

impl Iterator for SampleReceiver {
    type Item = EncodedSample;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl std::fmt::Debug for SampleReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleReceiver")
            .field("track", &self.track)
            .field("pending", &self.inner.len())
            .finish()
    }
}
