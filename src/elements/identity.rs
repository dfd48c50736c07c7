//! Pass-through stage with optional inspection.
//!
//! Forwards every buffer untouched. It does no per-buffer work, so the chain
//! builder never gives it its own queue.

use crate::buffer::Buffer;
use crate::element::{Element, Output};
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback type for buffer inspection.
pub type BufferCallback = Box<dyn Fn(&Buffer) + Send + Sync>;

/// Shared counters of an [`Identity`], readable after the stage has been
/// moved into a running chain.
#[derive(Debug, Clone, Default)]
pub struct IdentityCounters {
    buffers: Arc<AtomicU64>,
    bytes: Arc<AtomicU64>,
}

impl IdentityCounters {
    /// Current totals.
    pub fn snapshot(&self) -> IdentityStats {
        IdentityStats {
            buffer_count: self.buffers.load(Ordering::Relaxed),
            byte_count: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Totals seen by an [`Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityStats {
    /// Number of buffers forwarded.
    pub buffer_count: u64,
    /// Total bytes forwarded.
    pub byte_count: u64,
}

/// Pass-through stage.
///
/// ```rust
/// use visionpipe::buffer::Buffer;
/// use visionpipe::element::Element;
/// use visionpipe::elements::Identity;
/// use visionpipe::metadata::Metadata;
///
/// let mut identity = Identity::new().with_name("tap");
/// let counters = identity.counters();
/// identity.process(Buffer::new(vec![0u8; 10], Metadata::new())).unwrap();
/// assert_eq!(counters.snapshot().byte_count, 10);
/// ```
pub struct Identity {
    name: String,
    callback: Option<BufferCallback>,
    counters: IdentityCounters,
}

impl Identity {
    /// Create a new identity stage.
    pub fn new() -> Self {
        Self {
            name: "identity".to_string(),
            callback: None,
            counters: IdentityCounters::default(),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Call `callback` with every buffer before forwarding it.
    pub fn on_buffer<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Buffer) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Handle onto the counters.
    pub fn counters(&self) -> IdentityCounters {
        self.counters.clone()
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Identity {
    fn process(&mut self, buffer: Buffer) -> Result<Output> {
        self.counters.buffers.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes
            .fetch_add(buffer.len() as u64, Ordering::Relaxed);

        if let Some(cb) = &self.callback {
            cb(&buffer);
        }
        Ok(Output::Single(buffer))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_compute(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use std::sync::atomic::AtomicUsize;

    fn buffer(size: usize, seq: u64) -> Buffer {
        Buffer::new(vec![0u8; size], Metadata::with_sequence(seq))
    }

    #[test]
    fn test_identity_passthrough() {
        let mut identity = Identity::new();
        let input = buffer(100, 42);
        let ptr = input.data().as_ptr();

        let out = identity.process(input).unwrap().into_single().unwrap();
        assert_eq!(out.metadata().sequence, 42);
        assert_eq!(out.data().as_ptr(), ptr);
        assert!(!identity.is_compute());
    }

    #[test]
    fn test_identity_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut identity = Identity::new().on_buffer(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });

        for i in 0..5 {
            identity.process(buffer(50, i)).unwrap();
        }
        assert_eq!(calls.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_counters_outlive_stage() {
        let mut identity = Identity::new();
        let counters = identity.counters();
        for (i, size) in [100, 200, 50].into_iter().enumerate() {
            identity.process(buffer(size, i as u64)).unwrap();
        }
        drop(identity);
        assert_eq!(
            counters.snapshot(),
            IdentityStats {
                buffer_count: 3,
                byte_count: 350
            }
        );
    }
}
