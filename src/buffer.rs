//! Reference-counted media buffers.
//!
//! A [`Buffer`] is a [`Shared`] handle to [`BufferData`] (bytes plus
//! [`Metadata`]). Duplicating a buffer never copies its bytes, so many
//! owners can read the same data. Writing goes through the copy-on-write
//! gate:
//!
//! - [`Buffer::try_mut`] succeeds only for the sole owner.
//! - [`Buffer::make_writable`] copies the data first when it is shared, so
//!   other owners never observe the write.
//!
//! Pool-backed buffers remember their pool; when the last handle is released
//! their storage is offered back to it instead of being freed.

use crate::clock::ClockTime;
use crate::error::{Error, Result};
use crate::memory::{BufferAllocator, PoolOrigin};
use crate::shared::Shared;

/// Metadata associated with a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Sequence number, assigned by the producing node.
    pub sequence: u64,
    /// Presentation timestamp.
    pub pts: ClockTime,
    /// Decode timestamp.
    pub dts: ClockTime,
    /// Duration of the data.
    pub duration: ClockTime,
    /// Data does not continue the previous buffer of the flow.
    pub discontinuity: bool,
    /// Data starts at a random access point.
    pub random_access: bool,
}

impl Metadata {
    /// Create metadata with only a sequence number set.
    pub fn with_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Self::default()
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            sequence: 0,
            pts: ClockTime::NONE,
            dts: ClockTime::NONE,
            duration: ClockTime::NONE,
            discontinuity: false,
            random_access: false,
        }
    }
}

/// Payload of a [`Buffer`]: bytes, metadata and the pool the storage came from.
pub struct BufferData {
    storage: Vec<u8>,
    metadata: Metadata,
    origin: Option<PoolOrigin>,
}

impl BufferData {
    fn heap(storage: Vec<u8>, metadata: Metadata) -> Self {
        Self {
            storage,
            metadata,
            origin: None,
        }
    }

    /// Get the data as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage
    }

    /// Get the data as a mutable byte slice.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Length of the data.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the buffer holds no data.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Allocated capacity of the storage.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Resize the data, zero-filling new bytes.
    pub fn resize(&mut self, len: usize) {
        self.storage.resize(len, 0);
    }

    /// Shorten the data to `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.storage.truncate(len);
    }

    /// Append bytes, reporting an allocation failure instead of aborting.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.storage
            .try_reserve(bytes.len())
            .map_err(|e| Error::AllocationFailed(format!("extend by {} bytes: {}", bytes.len(), e)))?;
        self.storage.extend_from_slice(bytes);
        Ok(())
    }

    /// Get a reference to the metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get a mutable reference to the metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Check whether the storage returns to a pool on release.
    pub fn is_pooled(&self) -> bool {
        self.origin.is_some()
    }
}

impl Drop for BufferData {
    fn drop(&mut self) {
        if let Some(origin) = self.origin.take() {
            origin.recycle(std::mem::take(&mut self.storage));
        }
    }
}

impl std::fmt::Debug for BufferData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferData")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("metadata", &self.metadata)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

/// A reference-counted buffer.
///
/// # Example
///
/// ```rust
/// use pipework::buffer::Buffer;
///
/// let mut a = Buffer::from_vec(vec![1, 2, 3]);
/// let b = a.duplicate();
///
/// // Shared: in-place access is refused, make_writable copies.
/// assert!(a.try_mut().is_none());
/// a.make_writable()?.bytes_mut()[0] = 9;
///
/// assert_eq!(a.as_bytes(), &[9, 2, 3]);
/// assert_eq!(b.as_bytes(), &[1, 2, 3]);
/// # Ok::<(), pipework::Error>(())
/// ```
#[derive(Clone)]
pub struct Buffer {
    data: Shared<BufferData>,
}

impl Buffer {
    /// Create a heap buffer owning `bytes`.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self::from_vec_with(bytes, Metadata::default())
    }

    /// Create a heap buffer owning `bytes`, with metadata.
    pub fn from_vec_with(bytes: Vec<u8>, metadata: Metadata) -> Self {
        Self {
            data: Shared::new(BufferData::heap(bytes, metadata)),
        }
    }

    /// Create a heap buffer holding a copy of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(bytes.len())
            .map_err(|e| Error::AllocationFailed(format!("{} bytes: {}", bytes.len(), e)))?;
        storage.extend_from_slice(bytes);
        Ok(Self::from_vec(storage))
    }

    pub(crate) fn from_pool(storage: Vec<u8>, origin: PoolOrigin) -> Self {
        Self {
            data: Shared::new(BufferData {
                storage,
                metadata: Metadata::default(),
                origin: Some(origin),
            }),
        }
    }

    /// Get the buffer data as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// Get the length of the buffer data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a reference to the buffer's metadata.
    pub fn metadata(&self) -> &Metadata {
        self.data.metadata()
    }

    /// Check whether the storage returns to a pool on release.
    pub fn is_pooled(&self) -> bool {
        self.data.is_pooled()
    }

    /// Create a second owner of the same data. Never copies bytes.
    pub fn duplicate(&self) -> Self {
        Self {
            data: self.data.duplicate(),
        }
    }

    /// Release this owner's reference.
    pub fn release(self) {
        self.data.release();
    }

    /// Check whether this is the only handle to the data.
    pub fn is_exclusive(&self) -> bool {
        self.data.is_exclusive()
    }

    /// Current number of handles.
    pub fn ref_count(&self) -> usize {
        self.data.ref_count()
    }

    /// Check whether two buffers share the same data.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Shared::ptr_eq(&a.data, &b.data)
    }

    /// Mutable access to the data, only for the sole owner.
    pub fn try_mut(&mut self) -> Option<&mut BufferData> {
        self.data.get_mut()
    }

    /// Mutable access to the data, copying it to the heap first if shared.
    ///
    /// After this call the handle is exclusive; other owners keep the
    /// original, untouched data.
    pub fn make_writable(&mut self) -> Result<&mut BufferData> {
        if !self.data.is_exclusive() {
            let mut copy = Buffer::from_slice(self.as_bytes())?;
            copy.exclusive_mut()?.metadata = self.metadata().clone();
            tracing::trace!(len = self.len(), "copied shared buffer before write");
            *self = copy;
        }
        self.exclusive_mut()
    }

    /// Like [`make_writable`](Self::make_writable), but a shared buffer is
    /// copied into storage from `allocator` (typically a pool).
    pub fn make_writable_in(&mut self, allocator: &dyn BufferAllocator) -> Result<&mut BufferData> {
        if !self.data.is_exclusive() {
            let mut copy = allocator.alloc_buffer(self.len())?;
            if copy.len() != self.len() {
                return Err(Error::InvariantViolation(format!(
                    "allocator {} returned {} bytes, asked for {}",
                    allocator.name(),
                    copy.len(),
                    self.len()
                )));
            }
            let data = copy.exclusive_mut()?;
            data.bytes_mut().copy_from_slice(self.as_bytes());
            data.metadata = self.metadata().clone();
            *self = copy;
        }
        self.exclusive_mut()
    }

    fn exclusive_mut(&mut self) -> Result<&mut BufferData> {
        self.data.get_mut().ok_or_else(|| {
            Error::InvariantViolation("write access to a shared buffer".into())
        })
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("refs", &self.ref_count())
            .field("metadata", self.metadata())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}
