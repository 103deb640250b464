use std::io::{self, Read, Write};

pub use crate::block::{
    decompress, read_block, write_block, BlockHeader, CodecError, Method, CHECKSUM_SIZE,
    HEADER_SIZE,
};
pub use crate::cache::{BlockCell, CacheStats, UncompressedCache};
pub use crate::fingerprint::Fingerprint;
pub use crate::reader::{CachedBlockReader, ReadError, DEFAULT_BUF_SIZE};
pub use crate::staging::{StagingBuffer, StagingExhausted, AIO_BLOCK_SIZE};

/// Outcome of packing a byte stream into blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub blocks: u64,
    pub input_bytes: u64,
    pub stored_bytes: u64,
}

/// Splits `input` into independently compressed blocks of at most
/// `block_size` decompressed bytes each and writes them to `out`.
///
/// An empty input produces an empty stream; end of stream is the end of
/// the output, not a trailing marker.
pub fn pack_into(
    input: &mut impl Read,
    out: &mut impl Write,
    block_size: usize,
    method: Method,
) -> io::Result<PackSummary> {
    if block_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "block_size must be > 0",
        ));
    }

    let mut chunk = vec![0_u8; block_size];
    let mut summary = PackSummary::default();

    loop {
        let mut filled = 0;
        while filled < block_size {
            let n = input.read(&mut chunk[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }

        let header = write_block(&chunk[..filled], method, out)?;
        summary.blocks += 1;
        summary.input_bytes += filled as u64;
        summary.stored_bytes += header.stored_size();

        if filled < block_size {
            break;
        }
    }

    Ok(summary)
}
