#![forbid(unsafe_code)]

mod backing;
mod block;
mod cache;
mod fingerprint;
mod reader;
mod staging;

pub mod api;

pub use api::{
    decompress, pack_into, read_block, write_block, BlockCell, BlockHeader, CacheStats,
    CachedBlockReader, CodecError, Fingerprint, Method, PackSummary, ReadError, StagingBuffer,
    StagingExhausted, UncompressedCache, DEFAULT_BUF_SIZE,
};
