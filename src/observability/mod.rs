//! Observability: metrics and tracing.
//!
//! ## Metrics
//!
//! Every metric carries a `track` label.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `visionpipe_buffers_injected` | Counter | Buffers accepted by the ingress |
//! | `visionpipe_bytes_injected` | Counter | Bytes accepted by the ingress |
//! | `visionpipe_frames_processed` | Counter | Buffers processed per stage |
//! | `visionpipe_frame_processing_time_ns` | Histogram | Time in one stage per buffer |
//! | `visionpipe_samples_emitted` | Counter | Samples handed to the consumer |
//! | `visionpipe_samples_dropped` | Counter | Samples dropped at the egress |
//! | `visionpipe_queue_bytes` | Gauge | Bytes held by a queue |
//! | `visionpipe_chain_errors` | Counter | Fatal worker errors |
//!
//! No recorder is installed by the library; without one the calls are no-ops.
//!
//! ## Tracing
//!
//! Each chain worker runs inside a `segment{track, index}` span, so stage
//! logs carry the track they belong to.
//!
//! ## Example
//!
//! ```rust,ignore
//! use visionpipe::observability::init_metrics;
//!
//! // Describe the metrics once, after installing an exporter.
//! init_metrics();
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{
    StageMetrics, TimerGuard, init_metrics, record_chain_error, record_injected, record_queue_bytes,
    record_sample_dropped, record_sample_emitted,
};
pub use tracing_support::{span_segment, trace_state_change};
