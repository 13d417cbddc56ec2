use std::io;

use thiserror::Error;

/// The set of all possible errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("bad superblock magic {0:#06x}")]
    BadMagic(u16),
    #[error("address {sector}:{offset} out of bounds (sector size {size})")]
    AddressOutOfBounds {
        sector: u64,
        offset: u32,
        size: usize,
    },
    #[error(
        "block group count mismatch: {by_blocks} by blocks, {by_inodes} by inodes"
    )]
    BadBlockGroupCount { by_blocks: u32, by_inodes: u32 },
    #[error("invalid superblock: {0}")]
    InvalidSuperblock(&'static str),
    #[error("cannot decode {structure}: need {needed} bytes, got {actual}")]
    Decode {
        structure: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("corrupt extent tree in inode {inode}: {reason}")]
    CorruptExtentTree { inode: u32, reason: &'static str },
    #[error("inode {inode}: no extent maps logical block {block}")]
    ExtentNotFound { inode: u32, block: u64 },
    #[error("inode {inode} does not use extents")]
    NotExtentMapped { inode: u32 },
    #[error("inode {inode} stores its data inline")]
    InlineData { inode: u32 },
    #[error(
        "corrupt directory entry in inode {inode} at offset {offset}: {reason}"
    )]
    CorruptDirectoryEntry {
        inode: u32,
        offset: u64,
        reason: &'static str,
    },
    #[error("inode {inode}: unexpected end of data at offset {offset}")]
    UnexpectedEof { inode: u32, offset: u64 },
    #[error("inode {inode} is out of range")]
    InodeOutOfRange { inode: u32 },
    #[error("inode {inode} is not a directory")]
    NotADirectory { inode: u32 },
    #[error("directory {inode} is reachable twice")]
    DirectoryCycle { inode: u32 },
    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::Io(err) => err,
            Error::UnexpectedEof { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err)
            }
            err => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}
