/// Block alignment of the storage medium; sizes the staging buffer for the
/// large-read regime.
pub const AIO_BLOCK_SIZE: usize = 4096;

/// Close to the golden ratio.
const GROWTH_FACTOR: f64 = 1.6;

/// A fill needed more scratch space than the caller-supplied buffer holds.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("borrowed staging buffer too small: need {needed} bytes, have {available}")]
pub struct StagingExhausted {
    pub needed: usize,
    pub available: usize,
}

/// Scratch space for raw reads prior to decompression.
///
/// Either self-managed and growable, or wrapping caller-owned memory the
/// manager takes no growth or deallocation responsibility for.
#[derive(Debug)]
pub enum StagingBuffer<'a> {
    /// Grows monotonically; never shrinks.
    Owned(Vec<u8>),
    /// Used as-is; a request beyond its length fails with
    /// [`StagingExhausted`].
    Borrowed(&'a mut [u8]),
}

impl<'a> StagingBuffer<'a> {
    pub fn capacity(&self) -> usize {
        match self {
            StagingBuffer::Owned(buf) => buf.len(),
            StagingBuffer::Borrowed(slice) => slice.len(),
        }
    }

    /// First-use sizing; borrowed buffers are used as-is.
    pub fn prepare(&mut self, capacity: usize) {
        if let StagingBuffer::Owned(buf) = self {
            if buf.len() < capacity {
                buf.resize(capacity, 0);
            }
        }
    }

    /// Makes at least `size` bytes addressable and returns the full
    /// scratch slice.
    ///
    /// Owned buffers that must grow are scaled past the request by the
    /// growth factor to amortize reallocation across many fills; smaller
    /// subsequent requests never shrink the buffer.
    pub fn reserve(&mut self, size: usize) -> Result<&mut [u8], StagingExhausted> {
        match self {
            StagingBuffer::Owned(buf) => {
                if buf.is_empty() {
                    buf.resize(size, 0);
                } else if buf.len() < size {
                    buf.resize((size as f64 * GROWTH_FACTOR) as usize, 0);
                }
                Ok(&mut buf[..])
            }
            StagingBuffer::Borrowed(slice) => {
                if slice.len() < size {
                    return Err(StagingExhausted {
                        needed: size,
                        available: slice.len(),
                    });
                }
                Ok(&mut slice[..])
            }
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            StagingBuffer::Owned(buf) => buf,
            StagingBuffer::Borrowed(slice) => slice,
        }
    }
}

pub fn align_up(size: usize, alignment: usize) -> usize {
    size.div_ceil(alignment) * alignment
}

/// First-use capacity given the read-strategy hints: the configured buffer
/// size below the aio threshold, an aligned double-buffer above it.
pub fn initial_capacity(buf_size: usize, estimated_size: u64, aio_threshold: u64) -> usize {
    if aio_threshold == 0 || estimated_size < aio_threshold {
        buf_size
    } else {
        2 * align_up(buf_size + AIO_BLOCK_SIZE, AIO_BLOCK_SIZE)
    }
}
