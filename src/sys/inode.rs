use std::fmt::{self, Debug};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;

/// Bytes of the inode every revision carries
pub const INODE_BASE_SIZE: usize = 128;
/// Size of `i_block`, which holds the extent tree root
pub const INODE_BLOCK_SIZE: usize = 60;
/// Inode of the root directory
pub const ROOT_INODE: u32 = 2;

/// An inode is a structure on the disk that represents a file, directory,
/// symbolic link, etc. Inodes do not contain the data of the file / directory /
/// etc. that they represent. Instead, they link to the blocks that actually
/// contain the data. Each block group has an array of inodes it is
/// responsible for, and conversely every inode within a file system belongs
/// to one of such tables (and one of such block groups).
///
/// Only the first 128 bytes are decoded; the extended area past them holds
/// timestamps and checksums that reading file data does not need.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    /// Type and Permissions (see `TypePerm`)
    pub type_perm: u16,
    /// User ID
    pub uid: u16,
    /// Lower 32 bits of size in bytes
    pub size_low: u32,
    /// Last Access Time (in POSIX time)
    pub atime: u32,
    /// Creation Time (in POSIX time)
    pub ctime: u32,
    /// Last Modification time (in POSIX time)
    pub mtime: u32,
    /// Deletion time (in POSIX time)
    pub dtime: u32,
    /// Group ID
    pub gid: u16,
    /// Count of hard links (directory entries) to this inode
    pub hard_links: u16,
    /// Count of 512-byte sectors in use by this inode
    pub sectors_count: u32,
    /// Raw `i_flags` (see `InodeFlags`)
    pub flags: u32,
    /// Extent tree root, or the legacy block map for non-extent inodes
    pub block: [u8; INODE_BLOCK_SIZE],
    /// Generation number (Primarily used for NFS)
    pub gen_number: u32,
    /// Extended attribute block (File ACL), low 32 bits
    pub file_acl: u32,
    /// Upper 32 bits of file size
    pub size_high: u32,
}

impl Debug for Inode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Inode")
            .field("type_perm", &self.type_perm())
            .field("uid", &self.uid)
            .field("size", &self.size())
            .field("gid", &self.gid)
            .field("hard_links", &self.hard_links)
            .field("sectors_count", &self.sectors_count)
            .field("flags", &self.inode_flags())
            .finish()
    }
}

impl Inode {
    pub fn from_bytes(b: &[u8]) -> Result<Inode, Error> {
        if b.len() < INODE_BASE_SIZE {
            return Err(Error::Decode {
                structure: "inode",
                needed: INODE_BASE_SIZE,
                actual: b.len(),
            });
        }

        let mut block = [0_u8; INODE_BLOCK_SIZE];
        block.copy_from_slice(&b[0x28..0x28 + INODE_BLOCK_SIZE]);

        Ok(Inode {
            type_perm: LittleEndian::read_u16(&b[0x00..]),
            uid: LittleEndian::read_u16(&b[0x02..]),
            size_low: LittleEndian::read_u32(&b[0x04..]),
            atime: LittleEndian::read_u32(&b[0x08..]),
            ctime: LittleEndian::read_u32(&b[0x0C..]),
            mtime: LittleEndian::read_u32(&b[0x10..]),
            dtime: LittleEndian::read_u32(&b[0x14..]),
            gid: LittleEndian::read_u16(&b[0x18..]),
            hard_links: LittleEndian::read_u16(&b[0x1A..]),
            sectors_count: LittleEndian::read_u32(&b[0x1C..]),
            flags: LittleEndian::read_u32(&b[0x20..]),
            block,
            gen_number: LittleEndian::read_u32(&b[0x64..]),
            file_acl: LittleEndian::read_u32(&b[0x68..]),
            size_high: LittleEndian::read_u32(&b[0x6C..]),
        })
    }

    pub fn size(&self) -> u64 {
        self.size_low as u64 | (self.size_high as u64) << 32
    }

    pub fn type_perm(&self) -> TypePerm {
        TypePerm::from_bits_truncate(self.type_perm)
    }

    /// The file type bits alone; they are an enumeration, not a set.
    pub fn file_type(&self) -> TypePerm {
        TypePerm::from_bits_truncate(self.type_perm & TypePerm::TYPE_MASK.bits())
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == TypePerm::DIRECTORY
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == TypePerm::FILE
    }

    pub fn inode_flags(&self) -> InodeFlags {
        InodeFlags::from_bits_truncate(self.flags)
    }

    pub fn uses_extents(&self) -> bool {
        self.flags & InodeFlags::EXTENTS.bits() != 0
    }

    pub fn has_inline_data(&self) -> bool {
        self.flags & InodeFlags::INLINE_DATA.bits() != 0
    }
}

bitflags! {
    pub struct TypePerm: u16 {
        /// Mask selecting the file type bits
        const TYPE_MASK = 0xF000;
        /// FIFO
        const FIFO = 0x1000;
        /// Character device
        const CHAR_DEVICE = 0x2000;
        /// Directory
        const DIRECTORY = 0x4000;
        /// Block device
        const BLOCK_DEVICE = 0x6000;
        /// Regular file
        const FILE = 0x8000;
        /// Symbolic link
        const SYMLINK = 0xA000;
        /// Unix socket
        const SOCKET = 0xC000;
        /// Other: execute permission
        const O_EXEC = 0x001;
        /// Other: write permission
        const O_WRITE = 0x002;
        /// Other: read permission
        const O_READ = 0x004;
        /// Group: execute permission
        const G_EXEC = 0x008;
        /// Group: write permission
        const G_WRITE = 0x010;
        /// Group: read permission
        const G_READ = 0x020;
        /// User: execute permission
        const U_EXEC = 0x040;
        /// User: write permission
        const U_WRITE = 0x080;
        /// User: read permission
        const U_READ = 0x100;
        /// Sticky Bit
        const STICKY = 0x200;
        /// Set group ID
        const SET_GID = 0x400;
        /// Set user ID
        const SET_UID = 0x800;
    }
}

bitflags! {
    pub struct InodeFlags: u32 {
        /// Secure deletion (not used)
        const SECURE_DEL = 0x00000001;
        /// Keep a copy of data when deleted (not used)
        const KEEP_COPY = 0x00000002;
        /// File compression (not used)
        const COMPRESSION = 0x00000004;
        /// Synchronous updates: new data is written immediately to disk
        const SYNC_UPDATE = 0x00000008;
        /// Immutable file (content cannot be changed)
        const IMMUTABLE = 0x00000010;
        /// Append only
        const APPEND_ONLY = 0x00000020;
        /// File is not included in 'dump' command
        const NODUMP = 0x00000040;
        /// Last accessed time should not updated
        const DONT_ATIME = 0x00000080;
        /// Hash indexed directory
        const HASH_DIR = 0x00001000;
        /// Journal file data
        const JOURNAL_DATA = 0x00004000;
        /// Huge file (sizes in filesystem blocks)
        const HUGE_FILE = 0x00040000;
        /// Inode uses extents
        const EXTENTS = 0x00080000;
        /// Inode stores large extended attribute value in its data blocks
        const EA_INODE = 0x00200000;
        /// Inode has inline data
        const INLINE_DATA = 0x10000000;
    }
}
