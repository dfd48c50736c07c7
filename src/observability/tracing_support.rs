//! Tracing spans and events for chain workers.

use tracing::{Level, Span, span};

/// Span for the worker running segment `index` of `track`.
///
/// ```rust
/// use visionpipe::observability::span_segment;
///
/// let span = span_segment("track-1", 0);
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_segment(track: &str, index: usize) -> Span {
    span!(Level::INFO, "segment", track = %track, index = index)
}

/// Log a chain state change.
#[inline]
pub fn trace_state_change(track: &str, from: &str, to: &str) {
    tracing::info!(track = %track, from = %from, to = %to, "chain state changed");
}
