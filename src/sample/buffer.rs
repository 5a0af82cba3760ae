//! Scratch buffers for decompression, and the whole-sample RAM cache

/// Scratch space compressed frames are read into before decoding.
///
/// Every thread streaming samples concurrently needs its own.
#[derive(Debug, Default, Clone)]
pub struct DecompressionBuffer {
    data: Vec<u8>,
}

impl DecompressionBuffer {
    /// Size in bytes
    #[must_use]
    pub const fn size(&self) -> usize {
        self.data.len()
    }
    /// Frees the buffer's memory. The buffer can still be used afterwards,
    /// reads through it just produce nothing until it is grown again.
    pub fn destroy(&mut self) {
        self.data = Vec::new();
    }
    pub(crate) fn grow(&mut self, size: usize) {
        if self.data.len() < size {
            self.data.resize(size, 0);
        }
    }
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data
    }
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Creates a buffer big enough to read `max_read_size` samples of any
/// compressed sample in one go.
///
/// Assumes the worst case: stereo 24 bit samples in 256 sample frames, each
/// with two mode bytes and a 12 byte header.
#[must_use]
pub fn create_decompression_buffer(max_read_size: usize) -> DecompressionBuffer {
    let size = max_read_size.saturating_mul(3 * 2 * (256 + 12 + 2)) / 256;
    DecompressionBuffer {
        data: vec![0; size],
    }
}

/// Decoded sample data kept in memory
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RamCache {
    pub(crate) data: Vec<u8>,
    pub(crate) size: usize,
}

impl RamCache {
    /// Bytes of decoded sample data
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }
    /// Decoded sample data followed by the silence extension
    #[must_use]
    pub fn padded(&self) -> &[u8] {
        &self.data
    }
    /// Size of the decoded sample data in bytes
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }
    /// Size of the trailing silence in bytes
    #[must_use]
    pub const fn null_extension_size(&self) -> usize {
        self.data.len() - self.size
    }
    /// Whether nothing is cached
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
