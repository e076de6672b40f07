//! BLOB payload buffers
//!
//! A `BlobBuffer` owns the raw bytes of one BLOB widget together with the
//! logical size the server declared for it. Bytes are never re-encoded and
//! may contain any value, including zero bytes.

/// Owned binary payload with a declared logical size
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobBuffer {
    data: Vec<u8>,
    declared_size: usize,
}

impl BlobBuffer {
    /// Empty buffer expecting `declared_size` bytes, with capacity reserved
    pub fn new(declared_size: usize) -> Self {
        Self {
            data: Vec::with_capacity(declared_size),
            declared_size,
        }
    }

    /// Buffer holding `bytes` whose declared size is their length
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let data = bytes.into();
        let declared_size = data.len();
        Self {
            data,
            declared_size,
        }
    }

    /// Buffer holding `bytes` against an explicitly declared size
    pub fn with_declared_size(bytes: impl Into<Vec<u8>>, declared_size: usize) -> Self {
        Self {
            data: bytes.into(),
            declared_size,
        }
    }

    /// Append a transport chunk
    pub fn extend_from_slice(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// Bytes accumulated so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity, independent of the declared size
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Logical size announced by the server
    pub fn declared_size(&self) -> usize {
        self.declared_size
    }

    /// True once the accumulated length matches the declared size
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.declared_size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Check a completed transfer, returning `(declared, received)` on mismatch
    pub fn verify(&self) -> Result<(), (usize, usize)> {
        if self.is_complete() {
            Ok(())
        } else {
            Err((self.declared_size, self.data.len()))
        }
    }
}

impl AsRef<[u8]> for BlobBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
