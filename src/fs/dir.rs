use std::borrow::Cow;

use genfs::{Dir, DirEntry};

use crate::error::Error;
use crate::sector::SectorSize;
use crate::sys::dir_entry::{DirEntryHeader, FileType, DIR_ENTRY_HEADER_SIZE};
use crate::volume::Volume;

use super::reader::InodeReader;
use super::sync::Inode;

/// Decodes the linear list of entries stored in a directory inode.
///
/// Unused slots (inode 0, or an inode number the filesystem cannot hold)
/// are stepped over. Once an error or the end of the directory has been
/// returned, the browser yields nothing more.
pub struct DirectoryBrowser<S: SectorSize, V: Volume<u8, S>> {
    reader: InodeReader<S, V>,
    inode: u32,
    block_size: u64,
    inodes_count: u32,
    done: bool,
}

impl<S: SectorSize, V: Volume<u8, S>> DirectoryBrowser<S, V> {
    pub fn new(inode: Inode<S, V>) -> Result<DirectoryBrowser<S, V>, Error> {
        if !inode.is_dir() {
            return Err(Error::NotADirectory { inode: inode.num() });
        }
        let (block_size, inodes_count) = {
            let fs = inode.fs().inner();
            (fs.block_size() as u64, fs.total_inodes_count() as u32)
        };
        Ok(DirectoryBrowser {
            inode: inode.num(),
            reader: inode.reader(),
            block_size,
            inodes_count,
            done: false,
        })
    }

    pub fn inode(&self) -> u32 {
        self.inode
    }

    pub fn next_entry(&mut self) -> Result<Option<DirectoryEntry>, Error> {
        if self.done {
            return Ok(None);
        }
        let entry = self.decode();
        match entry {
            Ok(Some(_)) => (),
            _ => self.done = true,
        }
        entry
    }

    fn decode(&mut self) -> Result<Option<DirectoryEntry>, Error> {
        let inode = self.inode;
        loop {
            let start = self.reader.offset();
            let corrupt = |reason| Error::CorruptDirectoryEntry {
                inode,
                offset: start,
                reason,
            };

            let mut raw = [0_u8; DIR_ENTRY_HEADER_SIZE];
            match self.read_full(&mut raw)? {
                0 => return Ok(None),
                DIR_ENTRY_HEADER_SIZE => (),
                _ => return Err(corrupt("truncated entry header")),
            }
            let header = DirEntryHeader::from_bytes(&raw);

            let rec_len = header.record_len(self.block_size as usize) as u64;
            let name_len = header.name_len as u64;
            let header_len = DIR_ENTRY_HEADER_SIZE as u64;
            if rec_len < header_len + name_len {
                return Err(corrupt("record shorter than its name"));
            }
            if rec_len % 4 != 0 {
                return Err(corrupt("record length not a multiple of 4"));
            }
            if start % self.block_size + rec_len > self.block_size {
                return Err(corrupt("record crosses a block boundary"));
            }

            if header.inode == 0 || header.inode > self.inodes_count {
                trace!(
                    "directory {}: skipping unused slot at {} (inode {})",
                    inode,
                    start,
                    header.inode
                );
                if self.reader.skip(rec_len - header_len)? < rec_len - header_len {
                    return Err(corrupt("truncated record"));
                }
                continue;
            }

            let mut name = vec![0_u8; name_len as usize];
            if self.read_full(&mut name)? < name.len() {
                return Err(corrupt("truncated name"));
            }
            let padding = rec_len - header_len - name_len;
            if self.reader.skip(padding)? < padding {
                return Err(corrupt("truncated record"));
            }

            return Ok(Some(DirectoryEntry {
                inode: header.inode,
                rec_len: header.rec_len,
                name_len: header.name_len,
                file_type: FileType::from_raw(header.file_type),
                name,
            }));
        }
    }

    /// Reads until `buf` is full or the directory ends.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut filled = 0;
        while filled < buf.len() {
            let size = self.reader.read(&mut buf[filled..])?;
            if size == 0 {
                break;
            }
            filled += size;
        }
        Ok(filled)
    }
}

impl<S: SectorSize, V: Volume<u8, S>> Dir<DirectoryEntry, Error>
    for DirectoryBrowser<S, V>
{
}

impl<S: SectorSize, V: Volume<u8, S>> Iterator for DirectoryBrowser<S, V> {
    type Item = Result<DirectoryEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub inode: u32,
    /// Raw on-disk `rec_len`
    pub rec_len: u16,
    pub name_len: u8,
    pub file_type: FileType,
    pub name: Vec<u8>,
}

impl DirectoryEntry {
    pub fn name_str(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

impl DirEntry for DirectoryEntry {
    type Path = [u8];
    type PathOwned = Vec<u8>;
    type Metadata = ();
    type FileType = u8;
    type Error = Error;

    /// Only the entry's own name; the directory holding it is not known.
    fn path(&self) -> Self::PathOwned {
        self.name.clone()
    }

    fn metadata(&self) -> Result<Self::Metadata, Self::Error> {
        Ok(())
    }

    fn file_type(&self) -> Result<Self::FileType, Self::Error> {
        Ok(self.file_type.into_raw())
    }

    fn file_name(&self) -> &Self::Path {
        &self.name
    }
}
