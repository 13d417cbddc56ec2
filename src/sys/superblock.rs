use std::fmt::{self, Debug};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;
use crate::sector::{Address, SectorSize};
use crate::volume::Volume;

/// ext2/3/4 signature (0xef53), used to help confirm the presence of the
/// filesystem on a volume
pub const EXT4_MAGIC: u16 = 0xef53;

/// Byte offset of the superblock from the start of the volume
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// Size of the on-disk superblock record
pub const SUPERBLOCK_SIZE: usize = 1024;

/// Filesystem is free of errors
pub const FS_CLEAN: u16 = 1;
/// Filesystem has errors
pub const FS_ERR: u16 = 2;

/// Inode size used by revision 0 filesystems
pub const GOOD_OLD_INODE_SIZE: u16 = 128;

/// The Superblock contains all information about the layout of the file system
/// and what optional features were used to create it.
///
/// Only the fields needed to locate inodes and interpret their block maps are
/// decoded; journal, quota, checksum and encryption state are ignored.
#[derive(Clone, Copy)]
pub struct Superblock {
    /// Total number of inodes in file system
    pub inodes_count: u32,
    /// Total number of blocks in file system (lo and hi halves combined)
    pub blocks_count: u64,
    /// Total number of unallocated blocks
    pub free_blocks_count: u64,
    /// Total number of unallocated inodes
    pub free_inodes_count: u32,
    /// Block number of the block containing the superblock
    pub first_data_block: u32,
    /// log2 (block size) - 10
    pub log_block_size: u32,
    /// Number of blocks in each block group
    pub blocks_per_group: u32,
    /// Number of inodes in each block group
    pub inodes_per_group: u32,
    /// Signature, see `EXT4_MAGIC`
    pub magic: u16,
    /// File system state (see `FS_CLEAN` and `FS_ERR`)
    pub state: u16,
    /// Minor portion of version
    pub rev_minor: u16,
    /// Operating system ID from which the filesystem was created
    pub creator_os: u32,
    /// Major portion of version
    pub rev_major: u32,
    /// First non-reserved inode in file system
    pub first_inode: u32,
    /// Size of each inode structure in bytes
    pub inode_size: u16,
    /// Block group that this superblock is part of (if backup copy)
    pub block_group: u16,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
    /// File system ID (what is output by blkid)
    pub uuid: [u8; 16],
    /// Volume name (C-style string: characters terminated by a 0 byte)
    pub volume_name: [u8; 16],
    /// Size of a block group descriptor, only meaningful with `INCOMPAT_64BIT`
    pub desc_size: u16,
}

impl Debug for Superblock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Superblock")
            .field("inodes_count", &self.inodes_count)
            .field("blocks_count", &self.blocks_count)
            .field("free_blocks_count", &self.free_blocks_count)
            .field("free_inodes_count", &self.free_inodes_count)
            .field("first_data_block", &self.first_data_block)
            .field("log_block_size", &self.log_block_size)
            .field("blocks_per_group", &self.blocks_per_group)
            .field("inodes_per_group", &self.inodes_per_group)
            .field("magic", &self.magic)
            .field("state", &self.state)
            .field("rev_minor", &self.rev_minor)
            .field("creator_os", &self.creator_os)
            .field("rev_major", &self.rev_major)
            .field("first_inode", &self.first_inode)
            .field("inode_size", &self.inode_size)
            .field("block_group", &self.block_group)
            .field("features_compat", &self.features_compat())
            .field("features_incompat", &self.features_incompat())
            .field("features_ro_compat", &self.features_ro_compat())
            .field("uuid", &self.uuid)
            .field("volume_name", &String::from_utf8_lossy(self.volume_label()))
            .field("desc_size", &self.desc_size)
            .finish()
    }
}

impl Superblock {
    pub fn from_bytes(b: &[u8]) -> Result<Superblock, Error> {
        if b.len() < SUPERBLOCK_SIZE {
            return Err(Error::Decode {
                structure: "superblock",
                needed: SUPERBLOCK_SIZE,
                actual: b.len(),
            });
        }

        let mut uuid = [0_u8; 16];
        uuid.copy_from_slice(&b[0x68..0x78]);
        let mut volume_name = [0_u8; 16];
        volume_name.copy_from_slice(&b[0x78..0x88]);

        let superblock = Superblock {
            inodes_count: LittleEndian::read_u32(&b[0x00..]),
            blocks_count: LittleEndian::read_u32(&b[0x04..]) as u64
                | (LittleEndian::read_u32(&b[0x150..]) as u64) << 32,
            free_blocks_count: LittleEndian::read_u32(&b[0x0C..]) as u64
                | (LittleEndian::read_u32(&b[0x158..]) as u64) << 32,
            free_inodes_count: LittleEndian::read_u32(&b[0x10..]),
            first_data_block: LittleEndian::read_u32(&b[0x14..]),
            log_block_size: LittleEndian::read_u32(&b[0x18..]),
            blocks_per_group: LittleEndian::read_u32(&b[0x20..]),
            inodes_per_group: LittleEndian::read_u32(&b[0x28..]),
            magic: LittleEndian::read_u16(&b[0x38..]),
            state: LittleEndian::read_u16(&b[0x3A..]),
            rev_minor: LittleEndian::read_u16(&b[0x3E..]),
            creator_os: LittleEndian::read_u32(&b[0x48..]),
            rev_major: LittleEndian::read_u32(&b[0x4C..]),
            first_inode: LittleEndian::read_u32(&b[0x54..]),
            inode_size: LittleEndian::read_u16(&b[0x58..]),
            block_group: LittleEndian::read_u16(&b[0x5A..]),
            feature_compat: LittleEndian::read_u32(&b[0x5C..]),
            feature_incompat: LittleEndian::read_u32(&b[0x60..]),
            feature_ro_compat: LittleEndian::read_u32(&b[0x64..]),
            uuid,
            volume_name,
            desc_size: LittleEndian::read_u16(&b[0xFE..]),
        };

        superblock.validate()?;
        Ok(superblock)
    }

    /// Rejects geometry the rest of the crate cannot address safely.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.magic != EXT4_MAGIC {
            return Err(Error::BadMagic(self.magic));
        }
        if self.log_block_size > 6 {
            return Err(Error::InvalidSuperblock("block size above 64 KiB"));
        }
        if self.blocks_per_group == 0 || self.inodes_per_group == 0 {
            return Err(Error::InvalidSuperblock("empty block group"));
        }
        let inode_size = self.inode_size() as usize;
        if inode_size < GOOD_OLD_INODE_SIZE as usize
            || inode_size > self.block_size()
            || !inode_size.is_power_of_two()
        {
            return Err(Error::InvalidSuperblock("bad inode size"));
        }
        let desc_size = self.descriptor_size();
        if desc_size < 32 || desc_size > 1024 || !desc_size.is_power_of_two() {
            return Err(Error::InvalidSuperblock("bad descriptor size"));
        }
        Ok(())
    }

    pub fn find<S: SectorSize, V: Volume<u8, S>>(
        haystack: &V,
    ) -> Result<(Superblock, Address<S>), Error> {
        let offset = Address::from(SUPERBLOCK_OFFSET);
        let end = offset + Address::from(SUPERBLOCK_SIZE);
        let raw = haystack.slice(offset..end).map_err(Into::<Error>::into)?;
        let superblock = Superblock::from_bytes(&raw)?;
        Ok((superblock, offset))
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        1024 << self.log_block_size
    }

    /// `log2(block_size)`, the shift that turns block numbers into bytes.
    #[inline]
    pub fn log_block_bytes(&self) -> u32 {
        self.log_block_size + 10
    }

    pub fn inode_size(&self) -> u16 {
        if self.rev_major == 0 {
            GOOD_OLD_INODE_SIZE
        } else {
            self.inode_size
        }
    }

    pub fn descriptor_size(&self) -> usize {
        if self.features_incompat().contains(FeaturesIncompat::BIT64) {
            self.desc_size as usize
        } else {
            32
        }
    }

    /// Block holding the start of the descriptor table.
    pub fn descriptor_table_block(&self) -> u64 {
        self.first_data_block as u64 + 1
    }

    pub fn volume_label(&self) -> &[u8] {
        let end = self
            .volume_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.volume_name.len());
        &self.volume_name[..end]
    }

    pub fn features_compat(&self) -> FeaturesCompat {
        FeaturesCompat::from_bits_truncate(self.feature_compat)
    }

    pub fn features_incompat(&self) -> FeaturesIncompat {
        FeaturesIncompat::from_bits_truncate(self.feature_incompat)
    }

    pub fn features_ro_compat(&self) -> FeaturesRoCompat {
        FeaturesRoCompat::from_bits_truncate(self.feature_ro_compat)
    }

    /// Last unmounted cleanly.
    pub fn is_clean(&self) -> bool {
        self.state & FS_CLEAN != 0
    }

    /// The kernel recorded errors on this volume.
    pub fn has_errors(&self) -> bool {
        self.state & FS_ERR != 0
    }

    /// Incompatible feature bits this crate does not know about.
    pub fn unknown_incompat(&self) -> u32 {
        self.feature_incompat & !FeaturesIncompat::all().bits()
    }

    pub fn block_group_count(&self) -> Result<u32, (u32, u32)> {
        let blocks = self
            .blocks_count
            .saturating_sub(self.first_data_block as u64);
        let by_blocks =
            div_ceil(blocks, self.blocks_per_group as u64) as u32;
        let by_inodes = div_ceil(
            self.inodes_count as u64,
            self.inodes_per_group as u64,
        ) as u32;
        if by_blocks == by_inodes {
            Ok(by_blocks)
        } else {
            Err((by_blocks, by_inodes))
        }
    }
}

fn div_ceil(a: u64, b: u64) -> u64 {
    if b == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

bitflags! {
    /// Compatible features; safe to ignore when reading
    pub struct FeaturesCompat: u32 {
        const DIR_PREALLOC = 0x0001;
        const IMAGIC_INODES = 0x0002;
        /// File system has a journal
        const HAS_JOURNAL = 0x0004;
        const EXT_ATTR = 0x0008;
        const RESIZE_INODE = 0x0010;
        /// Directories use hash index
        const DIR_INDEX = 0x0020;
        const SPARSE_SUPER2 = 0x0200;
    }
}

bitflags! {
    /// Incompatible features. If these are not supported; can't read
    pub struct FeaturesIncompat: u32 {
        const COMPRESSION = 0x0001;
        /// Directory entries contain a type field
        const FILETYPE = 0x0002;
        /// File system needs to replay its journal
        const RECOVER = 0x0004;
        const JOURNAL_DEV = 0x0008;
        const META_BG = 0x0010;
        /// Files use extent trees
        const EXTENTS = 0x0040;
        /// 64-bit block numbers and descriptors
        const BIT64 = 0x0080;
        const MMP = 0x0100;
        const FLEX_BG = 0x0200;
        const EA_INODE = 0x0400;
        const DIRDATA = 0x1000;
        const CSUM_SEED = 0x2000;
        const LARGEDIR = 0x4000;
        const INLINE_DATA = 0x8000;
        const ENCRYPT = 0x10000;
        const CASEFOLD = 0x20000;
    }
}

bitflags! {
    /// Read-only compatible features
    pub struct FeaturesRoCompat: u32 {
        const SPARSE_SUPER = 0x0001;
        const LARGE_FILE = 0x0002;
        const BTREE_DIR = 0x0004;
        const HUGE_FILE = 0x0008;
        const GDT_CSUM = 0x0010;
        const DIR_NLINK = 0x0020;
        const EXTRA_ISIZE = 0x0040;
        const QUOTA = 0x0100;
        const BIGALLOC = 0x0200;
        const METADATA_CSUM = 0x0400;
    }
}
