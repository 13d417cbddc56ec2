use byteorder::{ByteOrder, LittleEndian};

/// Fixed part of `ext4_dir_entry_2`, before the name
pub const DIR_ENTRY_HEADER_SIZE: usize = 8;
/// `file_type` of the checksum record at the end of a directory block
pub const FT_DIR_CSUM: u8 = 0xDE;

/// File type tag stored in directory entries when the filesystem has the
/// `FILETYPE` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Unknown,
    RegularFile,
    Directory,
    CharacterDevice,
    BlockDevice,
    Fifo,
    Socket,
    Symlink,
}

impl FileType {
    pub fn from_raw(raw: u8) -> FileType {
        match raw {
            1 => FileType::RegularFile,
            2 => FileType::Directory,
            3 => FileType::CharacterDevice,
            4 => FileType::BlockDevice,
            5 => FileType::Fifo,
            6 => FileType::Socket,
            7 => FileType::Symlink,
            _ => FileType::Unknown,
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            FileType::Unknown => 0,
            FileType::RegularFile => 1,
            FileType::Directory => 2,
            FileType::CharacterDevice => 3,
            FileType::BlockDevice => 4,
            FileType::Fifo => 5,
            FileType::Socket => 6,
            FileType::Symlink => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntryHeader {
    /// Referenced inode; 0 marks an unused slot
    pub inode: u32,
    /// Raw `rec_len`, see `record_len`
    pub rec_len: u16,
    pub name_len: u8,
    pub file_type: u8,
}

impl DirEntryHeader {
    pub fn from_bytes(b: &[u8; DIR_ENTRY_HEADER_SIZE]) -> DirEntryHeader {
        DirEntryHeader {
            inode: LittleEndian::read_u32(&b[0..]),
            rec_len: LittleEndian::read_u16(&b[4..]),
            name_len: b[6],
            file_type: b[7],
        }
    }

    /// Length of the whole record. Blocks of 64 KiB and more store the low
    /// bits of large values in the two bits alignment keeps clear.
    pub fn record_len(&self, block_size: usize) -> usize {
        let len = self.rec_len as usize;
        if block_size < 65536 {
            len
        } else if len == 65535 || len == 0 {
            block_size
        } else {
            (len & 0xFFFC) | ((len & 0x3) << 16)
        }
    }
}
