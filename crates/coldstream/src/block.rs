use std::borrow::Cow;
use std::io::{self, Read, Write};

use crate::staging::{StagingBuffer, StagingExhausted};

/// Bytes of the checksum field preceding each block header.
pub const CHECKSUM_SIZE: usize = 4;

/// Bytes of the header covered by `compressed_size_without_checksum`:
/// method byte plus the two size fields.
pub const HEADER_SIZE: usize = 9;

/// Upper bound on either size field; anything larger is treated as framing
/// corruption rather than attempted.
pub const MAX_BLOCK_SIZE: u32 = 1 << 30;

/// zstd level used by the writer; decompression accepts any level.
pub const ZSTD_LEVEL: i32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// Payload stored verbatim.
    Raw,
    Zstd,
}

impl Method {
    pub fn as_byte(self) -> u8 {
        match self {
            Method::Raw => 0x00,
            Method::Zstd => 0x01,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Method::Raw),
            0x01 => Some(Method::Zstd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Raw => "raw",
            Method::Zstd => "zstd",
        }
    }
}

/// Parsed header of one block, in file order:
///
/// ```text
/// checksum      u32 LE   crc32c over everything after this field
/// method        u8
/// compressed    u32 LE   header-after-checksum + payload length
/// decompressed  u32 LE   logical payload size
/// payload       [u8]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub checksum: u32,
    pub method: Method,
    /// Includes [`HEADER_SIZE`], excludes the checksum field itself.
    pub compressed_size_without_checksum: u32,
    pub decompressed_size: u32,
}

impl BlockHeader {
    /// Total bytes the block occupies in the stream, checksum included.
    pub fn stored_size(&self) -> u64 {
        CHECKSUM_SIZE as u64 + u64::from(self.compressed_size_without_checksum)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Staging(#[from] StagingExhausted),

    #[error("truncated block: stream ended {missing} bytes short")]
    Truncated { missing: usize },

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("unknown compression method byte: {method:#04x}")]
    UnknownMethod { method: u8 },

    #[error("implausible compressed block size: {size}")]
    ImplausibleCompressedSize { size: u32 },

    #[error("implausible decompressed block size: {size}")]
    ImplausibleDecompressedSize { size: u32 },

    #[error("stored payload length {actual} does not match declared size {expected}")]
    StoredSizeMismatch { expected: usize, actual: usize },

    #[error("decompressed {actual} bytes but header declared {expected}")]
    DecompressedSizeMismatch { expected: usize, actual: usize },

    #[error("zstd decompression failed: {source}")]
    Decompress { source: io::Error },
}

/// Reads and checksums one block from `input` into `staging`.
///
/// Returns `Ok(None)` at a clean end of stream (no bytes available at a
/// block boundary); a partial header or payload is [`CodecError::Truncated`].
/// On success the returned slice is the checksummed region (header after
/// checksum + payload), staged and ready for [`decompress`].
pub fn read_block<'s>(
    input: &mut impl Read,
    staging: &'s mut StagingBuffer<'_>,
) -> Result<Option<(BlockHeader, &'s [u8])>, CodecError> {
    let mut prefix = [0_u8; CHECKSUM_SIZE + HEADER_SIZE];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = input.read(&mut prefix[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CodecError::Truncated {
                missing: prefix.len() - filled,
            });
        }
        filled += n;
    }

    let mut word = [0_u8; 4];
    word.copy_from_slice(&prefix[0..4]);
    let checksum = u32::from_le_bytes(word);

    let method_byte = prefix[4];
    let method = Method::from_byte(method_byte)
        .ok_or(CodecError::UnknownMethod { method: method_byte })?;

    word.copy_from_slice(&prefix[5..9]);
    let compressed_size_without_checksum = u32::from_le_bytes(word);
    word.copy_from_slice(&prefix[9..13]);
    let decompressed_size = u32::from_le_bytes(word);

    if compressed_size_without_checksum < HEADER_SIZE as u32
        || compressed_size_without_checksum > MAX_BLOCK_SIZE
    {
        return Err(CodecError::ImplausibleCompressedSize {
            size: compressed_size_without_checksum,
        });
    }
    if decompressed_size > MAX_BLOCK_SIZE {
        return Err(CodecError::ImplausibleDecompressedSize {
            size: decompressed_size,
        });
    }

    let staged_len = compressed_size_without_checksum as usize;
    let scratch = staging.reserve(staged_len)?;
    scratch[..HEADER_SIZE].copy_from_slice(&prefix[CHECKSUM_SIZE..]);

    let mut filled = HEADER_SIZE;
    while filled < staged_len {
        let n = input.read(&mut scratch[filled..staged_len])?;
        if n == 0 {
            return Err(CodecError::Truncated {
                missing: staged_len - filled,
            });
        }
        filled += n;
    }

    let actual = crc32c::crc32c(&scratch[..staged_len]);
    if actual != checksum {
        return Err(CodecError::ChecksumMismatch {
            expected: checksum,
            actual,
        });
    }

    let header = BlockHeader {
        checksum,
        method,
        compressed_size_without_checksum,
        decompressed_size,
    };
    Ok(Some((header, &staging.as_slice()[..staged_len])))
}

/// Decompresses the payload of a staged block into `dest`, which the
/// caller has sized to `header.decompressed_size`.
pub fn decompress(header: &BlockHeader, staged: &[u8], dest: &mut [u8]) -> Result<(), CodecError> {
    let payload = &staged[HEADER_SIZE..];
    match header.method {
        Method::Raw => {
            if payload.len() != dest.len() {
                return Err(CodecError::StoredSizeMismatch {
                    expected: dest.len(),
                    actual: payload.len(),
                });
            }
            dest.copy_from_slice(payload);
        }
        Method::Zstd => {
            let n = zstd::bulk::decompress_to_buffer(payload, dest)
                .map_err(|source| CodecError::Decompress { source })?;
            if n != dest.len() {
                return Err(CodecError::DecompressedSizeMismatch {
                    expected: dest.len(),
                    actual: n,
                });
            }
        }
    }
    Ok(())
}

/// Writes `payload` as one block and returns the header it was framed
/// under.
pub fn write_block(payload: &[u8], method: Method, out: &mut impl Write) -> io::Result<BlockHeader> {
    if payload.len() > MAX_BLOCK_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes exceeds the block size limit", payload.len()),
        ));
    }

    let compressed: Cow<'_, [u8]> = match method {
        Method::Raw => Cow::Borrowed(payload),
        Method::Zstd => Cow::Owned(zstd::bulk::compress(payload, ZSTD_LEVEL)?),
    };
    if compressed.len() > (MAX_BLOCK_SIZE as usize).saturating_sub(HEADER_SIZE) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "compressed payload exceeds the block size limit",
        ));
    }

    let compressed_size_without_checksum = (HEADER_SIZE + compressed.len()) as u32;
    let decompressed_size = payload.len() as u32;

    let mut header_bytes = [0_u8; HEADER_SIZE];
    header_bytes[0] = method.as_byte();
    header_bytes[1..5].copy_from_slice(&compressed_size_without_checksum.to_le_bytes());
    header_bytes[5..9].copy_from_slice(&decompressed_size.to_le_bytes());

    let mut checksum = crc32c::crc32c(&header_bytes);
    checksum = crc32c::crc32c_append(checksum, &compressed);

    out.write_all(&checksum.to_le_bytes())?;
    out.write_all(&header_bytes)?;
    out.write_all(&compressed)?;

    Ok(BlockHeader {
        checksum,
        method,
        compressed_size_without_checksum,
        decompressed_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(payload: &[u8], method: Method) -> Vec<u8> {
        let mut stream = Vec::new();
        let written = write_block(payload, method, &mut stream).unwrap();
        assert_eq!(written.stored_size(), stream.len() as u64);

        let mut staging = StagingBuffer::Owned(Vec::new());
        let mut input = &stream[..];
        let (header, staged) = read_block(&mut input, &mut staging).unwrap().unwrap();
        assert_eq!(header, written);

        let mut dest = vec![0_u8; header.decompressed_size as usize];
        decompress(&header, staged, &mut dest).unwrap();
        dest
    }

    #[test]
    fn round_trips_boundary_payload_sizes() {
        let block_size = 256_usize;
        for size in [0, 1, block_size - 1, block_size, 3 * block_size + 7] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            for method in [Method::Raw, Method::Zstd] {
                assert_eq!(round_trip(&payload, method), payload, "size={size}");
            }
        }
    }

    #[test]
    fn zstd_shrinks_redundant_payloads() {
        let payload = vec![0_u8; 64 * 1024];
        let mut stream = Vec::new();
        let header = write_block(&payload, Method::Zstd, &mut stream).unwrap();
        assert!(header.stored_size() < payload.len() as u64);
    }

    #[test]
    fn empty_input_is_clean_eof() {
        let mut staging = StagingBuffer::Owned(Vec::new());
        let got = read_block(&mut io::empty(), &mut staging).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn partial_header_is_truncated_not_eof() {
        let mut stream = Vec::new();
        write_block(b"abc", Method::Raw, &mut stream).unwrap();
        stream.truncate(6);

        let mut staging = StagingBuffer::Owned(Vec::new());
        let err = read_block(&mut &stream[..], &mut staging).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn partial_payload_is_truncated() {
        let mut stream = Vec::new();
        write_block(b"hello world", Method::Raw, &mut stream).unwrap();
        stream.pop();

        let mut staging = StagingBuffer::Owned(Vec::new());
        let err = read_block(&mut &stream[..], &mut staging).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { missing: 1 }));
    }

    #[test]
    fn flipped_payload_byte_fails_checksum() {
        let mut stream = Vec::new();
        write_block(b"hello world", Method::Raw, &mut stream).unwrap();
        let last = stream.len() - 1;
        stream[last] ^= 0xFF;

        let mut staging = StagingBuffer::Owned(Vec::new());
        let err = read_block(&mut &stream[..], &mut staging).unwrap_err();
        assert!(matches!(err, CodecError::ChecksumMismatch { .. }));
    }

    #[test]
    fn unknown_method_byte_is_rejected() {
        let mut stream = Vec::new();
        write_block(b"x", Method::Raw, &mut stream).unwrap();
        stream[CHECKSUM_SIZE] = 0x7F;

        let mut staging = StagingBuffer::Owned(Vec::new());
        let err = read_block(&mut &stream[..], &mut staging).unwrap_err();
        assert!(matches!(err, CodecError::UnknownMethod { method: 0x7F }));
    }

    #[test]
    fn implausible_compressed_size_is_rejected() {
        let mut stream = Vec::new();
        write_block(b"x", Method::Raw, &mut stream).unwrap();
        // Declare a compressed size smaller than its own header.
        stream[CHECKSUM_SIZE + 1..CHECKSUM_SIZE + 5].copy_from_slice(&3_u32.to_le_bytes());

        let mut staging = StagingBuffer::Owned(Vec::new());
        let err = read_block(&mut &stream[..], &mut staging).unwrap_err();
        assert!(matches!(
            err,
            CodecError::ImplausibleCompressedSize { size: 3 }
        ));
    }

    #[test]
    fn undersized_borrowed_staging_is_reported() {
        let mut stream = Vec::new();
        write_block(&[7_u8; 128], Method::Raw, &mut stream).unwrap();

        let mut backing = [0_u8; 16];
        let mut staging = StagingBuffer::Borrowed(&mut backing);
        let err = read_block(&mut &stream[..], &mut staging).unwrap_err();
        assert!(matches!(err, CodecError::Staging(_)));
    }

    #[test]
    fn consecutive_blocks_share_one_staging_buffer() {
        let mut stream = Vec::new();
        write_block(&[1_u8; 300], Method::Zstd, &mut stream).unwrap();
        write_block(&[2_u8; 10], Method::Raw, &mut stream).unwrap();

        let mut staging = StagingBuffer::Owned(Vec::new());
        let mut input = &stream[..];

        let (first, staged) = read_block(&mut input, &mut staging).unwrap().unwrap();
        let mut dest = vec![0_u8; first.decompressed_size as usize];
        decompress(&first, staged, &mut dest).unwrap();
        assert_eq!(dest, [1_u8; 300]);

        let (second, staged) = read_block(&mut input, &mut staging).unwrap().unwrap();
        let mut dest = vec![0_u8; second.decompressed_size as usize];
        decompress(&second, staged, &mut dest).unwrap();
        assert_eq!(dest, [2_u8; 10]);

        assert!(read_block(&mut input, &mut staging).unwrap().is_none());
    }
}
