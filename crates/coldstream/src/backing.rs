use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::staging::{align_up, AIO_BLOCK_SIZE};

/// How raw reads against the backing file are performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Positioned reads through a buffer of the configured size.
    Buffered,
    /// Large block-aligned reads for streams expected to exceed the aio
    /// threshold.
    Aligned,
}

impl ReadStrategy {
    pub fn choose(estimated_size: u64, aio_threshold: u64) -> Self {
        if aio_threshold == 0 || estimated_size < aio_threshold {
            ReadStrategy::Buffered
        } else {
            ReadStrategy::Aligned
        }
    }
}

/// Random-access byte source behind a reader.
///
/// Opening chooses the read strategy once from the size hints; the
/// buffer backing the chosen strategy is sized accordingly.
#[derive(Debug)]
pub struct BackingFile {
    input: BufReader<File>,
    strategy: ReadStrategy,
}

impl BackingFile {
    pub fn open(
        path: &Path,
        estimated_size: u64,
        aio_threshold: u64,
        buf_size: usize,
    ) -> io::Result<Self> {
        let strategy = ReadStrategy::choose(estimated_size, aio_threshold);
        let capacity = match strategy {
            ReadStrategy::Buffered => buf_size.max(1),
            ReadStrategy::Aligned => align_up(buf_size + AIO_BLOCK_SIZE, AIO_BLOCK_SIZE),
        };

        let file = File::open(path)?;
        Ok(Self {
            input: BufReader::with_capacity(capacity, file),
            strategy,
        })
    }

    pub fn strategy(&self) -> ReadStrategy {
        self.strategy
    }

    pub fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.input.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl Read for BackingFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn strategy_follows_the_threshold() {
        assert_eq!(ReadStrategy::choose(100, 0), ReadStrategy::Buffered);
        assert_eq!(ReadStrategy::choose(100, 200), ReadStrategy::Buffered);
        assert_eq!(ReadStrategy::choose(200, 200), ReadStrategy::Aligned);
        assert_eq!(ReadStrategy::choose(300, 200), ReadStrategy::Aligned);
    }

    #[test]
    fn seek_then_read_is_positioned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"0123456789").unwrap();
        drop(f);

        let mut backing = BackingFile::open(&path, 10, 0, 4).unwrap();
        backing.seek(6).unwrap();
        let mut out = [0_u8; 4];
        backing.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"6789");

        backing.seek(0).unwrap();
        let mut out = [0_u8; 2];
        backing.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"01");
    }

    #[test]
    fn missing_file_fails_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = BackingFile::open(&dir.path().join("absent.bin"), 0, 0, 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
