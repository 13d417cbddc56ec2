use std::io;

use crate::error::Error;
use crate::sector::SectorSize;
use crate::volume::Volume;

use super::extent::ExtentNavigator;
use super::sync::Inode;

/// Sequential byte stream over the payload of one inode.
///
/// Data arrives from the navigator one block-sized chunk at a time. The
/// stream ends after exactly `len()` bytes.
pub struct InodeReader<S: SectorSize, V: Volume<u8, S>> {
    navigator: ExtentNavigator<S, V>,
    chunk: Vec<u8>,
    cursor: usize,
    /// Bytes fetched from the navigator
    bytes_read: u64,
    bytes_total: u64,
    /// Bytes handed to the caller, read or skipped
    delivered: u64,
}

impl<S: SectorSize, V: Volume<u8, S>> InodeReader<S, V> {
    pub fn new(inode: Inode<S, V>) -> InodeReader<S, V> {
        InodeReader {
            bytes_total: inode.size(),
            navigator: ExtentNavigator::new(inode),
            chunk: Vec::new(),
            cursor: 0,
            bytes_read: 0,
            delivered: 0,
        }
    }

    pub fn inode(&self) -> &Inode<S, V> {
        self.navigator.inode()
    }

    /// Size of the whole stream.
    pub fn len(&self) -> u64 {
        self.bytes_total
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_total == 0
    }

    pub fn offset(&self) -> u64 {
        self.delivered
    }

    pub fn is_eof(&self) -> bool {
        self.residual() == 0 && self.bytes_read >= self.bytes_total
    }

    fn residual(&self) -> usize {
        self.chunk.len() - self.cursor
    }

    /// Makes sure some bytes are buffered. Returns `false` at end of stream.
    fn fill(&mut self) -> Result<bool, Error> {
        if self.residual() > 0 {
            return Ok(true);
        }
        if self.bytes_read >= self.bytes_total {
            return Ok(false);
        }

        let (chunk, count) = self.navigator.read(self.bytes_read)?;
        if count == 0 {
            return Err(Error::UnexpectedEof {
                inode: self.inode().num(),
                offset: self.bytes_read,
            });
        }
        self.bytes_read += count as u64;
        self.chunk = chunk;
        self.chunk.truncate(count);
        self.cursor = 0;
        Ok(true)
    }

    /// Copies the next bytes of the stream into `buf`. Returns 0 only at the
    /// end of the stream or for an empty `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.is_empty() || !self.fill()? {
            return Ok(0);
        }
        let size = self.residual().min(buf.len());
        buf[..size].copy_from_slice(&self.chunk[self.cursor..self.cursor + size]);
        self.cursor += size;
        self.delivered += size as u64;
        Ok(size)
    }

    /// Discards up to `count` bytes and returns how many were discarded,
    /// which is less than `count` only at the end of the stream.
    pub fn skip(&mut self, count: u64) -> Result<u64, Error> {
        let mut skipped = 0;
        while skipped < count && self.fill()? {
            let step = (self.residual() as u64).min(count - skipped);
            self.cursor += step as usize;
            skipped += step;
        }
        self.delivered += skipped;
        Ok(skipped)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let mut filled = 0;
        while filled < buf.len() {
            let size = self.read(&mut buf[filled..])?;
            if size == 0 {
                return Err(Error::UnexpectedEof {
                    inode: self.inode().num(),
                    offset: self.offset(),
                });
            }
            filled += size;
        }
        Ok(())
    }
}

impl<S: SectorSize, V: Volume<u8, S>> io::Read for InodeReader<S, V> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        InodeReader::read(self, buf).map_err(Into::into)
    }
}
