use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backing::BackingFile;
use crate::block::{self, CodecError};
use crate::cache::{BlockCell, UncompressedCache};
use crate::fingerprint::Fingerprint;
use crate::staging::{self, StagingBuffer, StagingExhausted};

/// Default capacity for buffered reads of the backing file.
pub const DEFAULT_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Checksum or framing violation in the backing stream. Fatal: the
    /// stored bytes cannot self-correct, so nothing is retried.
    #[error(transparent)]
    Corrupt(CodecError),

    #[error(transparent)]
    Staging(StagingExhausted),

    /// Recoverable: the reader stays positioned at the start of the block
    /// it refilled.
    #[error("seek to byte {requested} is beyond the decompressed block (size {available})")]
    SeekOutOfBounds { requested: usize, available: usize },
}

impl From<CodecError> for ReadError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(err) => ReadError::Io(err),
            CodecError::Staging(err) => ReadError::Staging(err),
            other => ReadError::Corrupt(other),
        }
    }
}

impl From<ReadError> for io::Error {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Random-access reader over a stream of independently compressed blocks,
/// sharing decompressed blocks with other readers through an
/// [`UncompressedCache`].
///
/// Construction performs no I/O; the backing file is opened on the first
/// cache miss. Each instance belongs to one execution context: share the
/// cache, not the reader.
pub struct CachedBlockReader<'a> {
    path: PathBuf,
    cache: Arc<UncompressedCache>,
    estimated_size: u64,
    aio_threshold: u64,
    buf_size: usize,

    file: Option<BackingFile>,
    /// Physical offset of the next block to fill.
    file_pos: u64,

    owned_cell: Option<Arc<BlockCell>>,
    cursor: usize,
    exhausted: bool,

    staging: StagingBuffer<'a>,
}

impl<'a> CachedBlockReader<'a> {
    pub fn new(
        path: impl AsRef<Path>,
        cache: Arc<UncompressedCache>,
        estimated_size: u64,
        aio_threshold: u64,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache,
            estimated_size,
            aio_threshold,
            buf_size: DEFAULT_BUF_SIZE,
            file: None,
            file_pos: 0,
            owned_cell: None,
            cursor: 0,
            exhausted: false,
            staging: StagingBuffer::Owned(Vec::new()),
        }
    }

    pub fn with_buf_size(mut self, buf_size: usize) -> Self {
        self.buf_size = buf_size;
        self
    }

    /// Uses caller-owned staging memory instead of self-managed scratch
    /// space; the reader will never grow or free it.
    pub fn with_staging(mut self, staging: &'a mut [u8]) -> Self {
        self.staging = StagingBuffer::Borrowed(staging);
        self
    }

    /// Physical offset of the next block to fill.
    pub fn physical_offset(&self) -> u64 {
        self.file_pos
    }

    /// Makes the next block's decompressed bytes the current window.
    ///
    /// Returns `Ok(false)` at end of stream, signalled by a zero-length
    /// block; that block is never published to the cache, and once seen
    /// the reader stays exhausted (no further backing-store probes) until
    /// a [`seek`](Self::seek) repositions it.
    pub fn advance(&mut self) -> Result<bool, ReadError> {
        if self.exhausted {
            return Ok(false);
        }

        let key = Fingerprint::compute(&self.path, self.file_pos);
        let cell = match self.cache.get(&key) {
            Some(cell) => cell,
            None => {
                let cell = Arc::new(self.fill_block()?);
                if !cell.data.is_empty() {
                    self.cache.set(key, Arc::clone(&cell));
                }
                cell
            }
        };

        if cell.data.is_empty() {
            self.owned_cell = None;
            self.cursor = 0;
            self.exhausted = true;
            return Ok(false);
        }

        self.file_pos += cell.compressed_size;
        self.cursor = 0;
        self.owned_cell = Some(cell);
        Ok(true)
    }

    /// Repositions to byte `logical_offset` within the block starting at
    /// `physical_offset` in the compressed stream.
    ///
    /// When the target lies inside the currently held block this only
    /// moves the cursor, with no cache lookup and no I/O. Otherwise the reader
    /// refills from `physical_offset` and fails with
    /// [`ReadError::SeekOutOfBounds`] if `logical_offset` exceeds the
    /// refilled block's decompressed size.
    pub fn seek(&mut self, physical_offset: u64, logical_offset: usize) -> Result<(), ReadError> {
        if let Some(cell) = &self.owned_cell {
            let cell_start = self.file_pos - cell.compressed_size;
            if physical_offset == cell_start && logical_offset <= cell.data.len() {
                self.cursor = logical_offset;
                return Ok(());
            }
        }

        self.owned_cell = None;
        self.cursor = 0;
        self.exhausted = false;
        self.file_pos = physical_offset;

        if !self.advance()? {
            if logical_offset > 0 {
                return Err(ReadError::SeekOutOfBounds {
                    requested: logical_offset,
                    available: 0,
                });
            }
            return Ok(());
        }

        let cell = self.owned_cell.as_ref().expect("advance served a block");
        if logical_offset > cell.data.len() {
            return Err(ReadError::SeekOutOfBounds {
                requested: logical_offset,
                available: cell.data.len(),
            });
        }
        self.cursor = logical_offset;
        Ok(())
    }

    fn ensure_open(&mut self) -> io::Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        self.staging.prepare(staging::initial_capacity(
            self.buf_size,
            self.estimated_size,
            self.aio_threshold,
        ));
        let file = BackingFile::open(
            &self.path,
            self.estimated_size,
            self.aio_threshold,
            self.buf_size,
        )?;
        tracing::debug!(
            path = %self.path.display(),
            strategy = ?file.strategy(),
            "opened backing file"
        );
        self.file = Some(file);
        Ok(())
    }

    /// Cache-miss path: raw read + decompress into a fresh cell. A clean
    /// end of stream yields the zero-length cell; partial data is never
    /// returned.
    fn fill_block(&mut self) -> Result<BlockCell, ReadError> {
        self.ensure_open()?;
        let file = self.file.as_mut().expect("ensure_open opened the file");
        file.seek(self.file_pos)?;

        let Some((header, staged)) = block::read_block(file, &mut self.staging)? else {
            return Ok(BlockCell {
                compressed_size: 0,
                data: Vec::new(),
            });
        };

        let mut data = vec![0_u8; header.decompressed_size as usize];
        block::decompress(&header, staged, &mut data)?;

        tracing::trace!(
            offset = self.file_pos,
            stored = header.stored_size(),
            decompressed = data.len(),
            "filled block"
        );
        Ok(BlockCell {
            compressed_size: header.stored_size(),
            data,
        })
    }
}

impl BufRead for CachedBlockReader<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let drained = match &self.owned_cell {
            Some(cell) => self.cursor >= cell.data.len(),
            None => true,
        };
        if drained && !self.advance()? {
            return Ok(&[]);
        }

        match &self.owned_cell {
            Some(cell) => Ok(&cell.data[self.cursor..]),
            None => Ok(&[]),
        }
    }

    fn consume(&mut self, amt: usize) {
        if let Some(cell) = &self.owned_cell {
            self.cursor = (self.cursor + amt).min(cell.data.len());
        }
    }
}

impl Read for CachedBlockReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.fill_buf()?;
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        self.consume(n);
        Ok(n)
    }
}
