//! Core element traits.

use crate::buffer::Buffer;
use crate::error::Result;
use crate::format::Caps;
use smallvec::SmallVec;

// ============================================================================
// Output Type
// ============================================================================

/// Output of element processing.
///
/// ```rust
/// use visionpipe::buffer::Buffer;
/// use visionpipe::element::Output;
///
/// let out = Output::from(Buffer::default());
/// assert_eq!(out.len(), 1);
/// assert!(Output::None.is_empty());
/// ```
#[derive(Debug, Default)]
pub enum Output {
    /// Nothing to forward (buffer consumed or dropped).
    #[default]
    None,
    /// One buffer.
    Single(Buffer),
    /// Several buffers, in order.
    Multiple(SmallVec<[Buffer; 2]>),
}

impl Output {
    /// Number of buffers.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::Multiple(v) => v.len(),
        }
    }

    /// Check if there is nothing to forward.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the single buffer, `None` for the other variants.
    pub fn into_single(self) -> Option<Buffer> {
        match self {
            Self::Single(b) => Some(b),
            _ => None,
        }
    }
}

impl From<Buffer> for Output {
    #[inline]
    fn from(b: Buffer) -> Self {
        Self::Single(b)
    }
}

impl From<Option<Buffer>> for Output {
    fn from(opt: Option<Buffer>) -> Self {
        opt.map_or(Self::None, Self::Single)
    }
}

impl IntoIterator for Output {
    type Item = Buffer;
    type IntoIter = smallvec::IntoIter<[Buffer; 2]>;

    fn into_iter(self) -> Self::IntoIter {
        let v: SmallVec<[Buffer; 2]> = match self {
            Self::None => SmallVec::new(),
            Self::Single(b) => smallvec::smallvec![b],
            Self::Multiple(v) => v,
        };
        v.into_iter()
    }
}

// ============================================================================
// Element
// ============================================================================

/// One processing stage in a chain.
///
/// Only [`process`](Element::process) and [`name`](Element::name) are
/// required. Everything else has a pass-through default.
///
/// Lifecycle, driven by the chain:
///
/// 1. construction (by the factory)
/// 2. [`link_upstream`](Element::link_upstream) / [`link_downstream`](Element::link_downstream)
/// 3. [`start`](Element::start)
/// 4. [`process`](Element::process) per buffer, on the segment's worker thread
/// 5. [`end_of_stream`](Element::end_of_stream) once, when the input drains
/// 6. [`release`](Element::release), in reverse construction order
pub trait Element: Send {
    /// Process one buffer.
    fn process(&mut self, buffer: Buffer) -> Result<Output>;

    /// Instance name.
    fn name(&self) -> &str;

    /// What this element accepts.
    fn input_caps(&self) -> Caps {
        Caps::Any
    }

    /// What this element produces.
    fn output_caps(&self) -> Caps {
        Caps::Any
    }

    /// Told the caps agreed with the upstream neighbor.
    fn link_upstream(&mut self, _caps: &Caps) -> Result<()> {
        Ok(())
    }

    /// Told the caps agreed with the downstream neighbor.
    fn link_downstream(&mut self, _caps: &Caps) -> Result<()> {
        Ok(())
    }

    /// Whether the element does enough work per buffer to get its own
    /// queue and worker thread.
    fn is_compute(&self) -> bool {
        true
    }

    /// Called once before the first buffer.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Input has drained; emit anything still held.
    fn end_of_stream(&mut self) -> Result<Output> {
        Ok(Output::None)
    }

    /// Release owned resources. Called once, after the last buffer.
    fn release(&mut self) {}
}
