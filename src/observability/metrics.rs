//! Metrics collection using metrics-rs.

use metrics::{Counter, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BUFFERS_INJECTED: &str = "visionpipe_buffers_injected";
const BYTES_INJECTED: &str = "visionpipe_bytes_injected";
const FRAMES_PROCESSED: &str = "visionpipe_frames_processed";
const PROCESSING_TIME_NS: &str = "visionpipe_frame_processing_time_ns";
const SAMPLES_EMITTED: &str = "visionpipe_samples_emitted";
const SAMPLES_DROPPED: &str = "visionpipe_samples_dropped";
const QUEUE_BYTES: &str = "visionpipe_queue_bytes";
const CHAIN_ERRORS: &str = "visionpipe_chain_errors";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_INJECTED,
        Unit::Count,
        "Buffers accepted by the ingress"
    );
    metrics::describe_counter!(BYTES_INJECTED, Unit::Bytes, "Bytes accepted by the ingress");
    metrics::describe_counter!(
        FRAMES_PROCESSED,
        Unit::Count,
        "Buffers processed by a stage"
    );
    metrics::describe_histogram!(
        PROCESSING_TIME_NS,
        Unit::Nanoseconds,
        "Time a stage spends on one buffer"
    );
    metrics::describe_counter!(
        SAMPLES_EMITTED,
        Unit::Count,
        "Encoded samples handed to the consumer"
    );
    metrics::describe_counter!(
        SAMPLES_DROPPED,
        Unit::Count,
        "Encoded samples dropped because the consumer lagged"
    );
    metrics::describe_gauge!(QUEUE_BYTES, Unit::Bytes, "Bytes held by a queue");
    metrics::describe_counter!(CHAIN_ERRORS, Unit::Count, "Fatal chain worker errors");
}

/// Record one injected buffer.
#[inline]
pub fn record_injected(track: &str, bytes: usize) {
    counter!(BUFFERS_INJECTED, "track" => track.to_string()).increment(1);
    counter!(BYTES_INJECTED, "track" => track.to_string()).increment(bytes as u64);
}

/// Record one sample handed to the consumer.
#[inline]
pub fn record_sample_emitted(track: &str) {
    counter!(SAMPLES_EMITTED, "track" => track.to_string()).increment(1);
}

/// Record one sample dropped at the egress.
#[inline]
pub fn record_sample_dropped(track: &str) {
    counter!(SAMPLES_DROPPED, "track" => track.to_string()).increment(1);
}

/// Record the bytes currently held by a queue.
#[inline]
pub fn record_queue_bytes(track: &str, queue: &str, bytes: usize) {
    gauge!(QUEUE_BYTES, "track" => track.to_string(), "queue" => queue.to_string())
        .set(bytes as f64);
}

/// Record a fatal worker error.
#[inline]
pub fn record_chain_error(track: &str) {
    counter!(CHAIN_ERRORS, "track" => track.to_string()).increment(1);
}

/// Metrics collector for one stage of one track.
#[derive(Clone)]
pub struct StageMetrics {
    track: String,
    stage: String,
    frames: Counter,
    processing_time: Histogram,
}

impl StageMetrics {
    /// Create a collector labelled with `track` and `stage`.
    pub fn new(track: &str, stage: &str) -> Self {
        Self {
            track: track.to_string(),
            stage: stage.to_string(),
            frames: counter!(
                FRAMES_PROCESSED,
                "track" => track.to_string(),
                "stage" => stage.to_string()
            ),
            processing_time: histogram!(
                PROCESSING_TIME_NS,
                "track" => track.to_string(),
                "stage" => stage.to_string()
            ),
        }
    }

    /// Record one processed buffer and the time it took.
    #[inline]
    pub fn record(&self, duration: Duration) {
        self.frames.increment(1);
        self.processing_time.record(duration.as_nanos() as f64);
    }

    /// Start a timer that records on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    /// Track label.
    pub fn track(&self) -> &str {
        &self.track
    }

    /// Stage label.
    pub fn stage(&self) -> &str {
        &self.stage
    }
}

/// Guard that records a processed buffer when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a StageMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record(self.start.elapsed());
    }
}
