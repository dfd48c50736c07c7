//! Buffer type passed between pipeline stages.

use crate::metadata::Metadata;
use bytes::Bytes;

/// A byte payload plus metadata.
///
/// The payload is reference counted, so cloning a buffer or handing it across a
/// queue never copies the bytes. Stages that produce new data build a fresh
/// [`Bytes`].
///
/// ```rust
/// use visionpipe::buffer::Buffer;
/// use visionpipe::metadata::Metadata;
///
/// let buffer = Buffer::new(vec![1u8, 2, 3], Metadata::with_sequence(0));
/// let shared = buffer.clone();
/// assert_eq!(shared.as_bytes(), &[1, 2, 3]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Bytes,
    metadata: Metadata,
}

impl Buffer {
    /// Create a buffer, taking ownership of `data`.
    pub fn new(data: impl Into<Bytes>, metadata: Metadata) -> Self {
        Self {
            data: data.into(),
            metadata,
        }
    }

    /// Payload bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the payload.
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Buffer metadata.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable buffer metadata.
    #[inline]
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Replace the payload, keeping the metadata.
    pub fn with_data(self, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata: self.metadata,
        }
    }

    /// Split into payload and metadata.
    pub fn into_parts(self) -> (Bytes, Metadata) {
        (self.data, self.metadata)
    }
}
