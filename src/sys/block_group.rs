use std::io::{self, Read};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;
use crate::sector::{Address, SectorSize};
use crate::volume::Volume;

/// Size of a full (64-bit feature) block group descriptor
pub const DESCRIPTOR_SIZE: usize = 64;
/// Size of a descriptor on filesystems without the 64-bit feature
pub const DESCRIPTOR_SIZE_32: usize = 32;

bitflags! {
    /// `bg_flags`
    pub struct BgFlags: u16 {
        /// Inode table and bitmap are not initialized
        const INODE_UNINIT = 0x1;
        /// Block bitmap is not initialized
        const BLOCK_UNINIT = 0x2;
        /// Inode table is zeroed
        const ITABLE_ZEROED = 0x4;
    }
}

/// The Block Group Descriptor Table contains a descriptor for each block group
/// within the file system. Each descriptor contains information regarding
/// where important data structures for that group are located.
///
/// The table is located in the block immediately following the Superblock.
/// If the block size is 1024 bytes, it begins at block 2. For any other block
/// size, it begins at block 1.
///
/// Every block number and count is split into a low and a high half; the high
/// halves only exist on filesystems with the 64-bit feature and read as zero
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockGroupDescriptor {
    /// Block address of block usage bitmap
    pub block_bitmap_lo: u32,
    /// Block address of inode usage bitmap
    pub inode_bitmap_lo: u32,
    /// Starting block address of inode table
    pub inode_table_lo: u32,
    /// Number of unallocated blocks in group
    pub free_blocks_count_lo: u16,
    /// Number of unallocated inodes in group
    pub free_inodes_count_lo: u16,
    /// Number of directories in group
    pub used_dirs_count_lo: u16,
    /// Raw `bg_flags`; unknown bits are kept as-is
    pub flags: u16,
    /// Snapshot exclusion bitmap
    pub exclude_bitmap_lo: u32,
    pub block_bitmap_csum_lo: u16,
    pub inode_bitmap_csum_lo: u16,
    /// Unused inodes count
    pub itable_unused_lo: u16,
    /// crc16(sb_uuid + group + desc)
    pub checksum: u16,
    pub block_bitmap_hi: u32,
    pub inode_bitmap_hi: u32,
    pub inode_table_hi: u32,
    pub free_blocks_count_hi: u16,
    pub free_inodes_count_hi: u16,
    pub used_dirs_count_hi: u16,
    pub itable_unused_hi: u16,
    pub exclude_bitmap_hi: u32,
    pub block_bitmap_csum_hi: u16,
    pub inode_bitmap_csum_hi: u16,
    #[doc(hidden)]
    pub _reserved: u32,
}

impl BlockGroupDescriptor {
    /// Reads exactly one 64-byte descriptor from `reader`.
    pub fn parse<R: Read>(reader: &mut R) -> Result<BlockGroupDescriptor, Error> {
        let mut raw = [0_u8; DESCRIPTOR_SIZE];
        let mut filled = 0;
        while filled < raw.len() {
            match reader.read(&mut raw[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        BlockGroupDescriptor::from_bytes(&raw[..filled])
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<BlockGroupDescriptor, Error> {
        BlockGroupDescriptor::from_bytes_sized(bytes, DESCRIPTOR_SIZE)
    }

    /// Decodes a descriptor of `desc_size` bytes. Anything smaller than 64
    /// bytes is treated as the 32-byte layout, leaving the high halves zero.
    pub fn from_bytes_sized(
        bytes: &[u8],
        desc_size: usize,
    ) -> Result<BlockGroupDescriptor, Error> {
        let needed = if desc_size >= DESCRIPTOR_SIZE {
            DESCRIPTOR_SIZE
        } else {
            DESCRIPTOR_SIZE_32
        };
        if bytes.len() < needed {
            return Err(Error::Decode {
                structure: "block group descriptor",
                needed,
                actual: bytes.len(),
            });
        }

        let b = bytes;
        let mut descr = BlockGroupDescriptor {
            block_bitmap_lo: LittleEndian::read_u32(&b[0x00..]),
            inode_bitmap_lo: LittleEndian::read_u32(&b[0x04..]),
            inode_table_lo: LittleEndian::read_u32(&b[0x08..]),
            free_blocks_count_lo: LittleEndian::read_u16(&b[0x0C..]),
            free_inodes_count_lo: LittleEndian::read_u16(&b[0x0E..]),
            used_dirs_count_lo: LittleEndian::read_u16(&b[0x10..]),
            flags: LittleEndian::read_u16(&b[0x12..]),
            exclude_bitmap_lo: LittleEndian::read_u32(&b[0x14..]),
            block_bitmap_csum_lo: LittleEndian::read_u16(&b[0x18..]),
            inode_bitmap_csum_lo: LittleEndian::read_u16(&b[0x1A..]),
            itable_unused_lo: LittleEndian::read_u16(&b[0x1C..]),
            checksum: LittleEndian::read_u16(&b[0x1E..]),
            ..BlockGroupDescriptor::default()
        };

        if needed == DESCRIPTOR_SIZE {
            descr.block_bitmap_hi = LittleEndian::read_u32(&b[0x20..]);
            descr.inode_bitmap_hi = LittleEndian::read_u32(&b[0x24..]);
            descr.inode_table_hi = LittleEndian::read_u32(&b[0x28..]);
            descr.free_blocks_count_hi = LittleEndian::read_u16(&b[0x2C..]);
            descr.free_inodes_count_hi = LittleEndian::read_u16(&b[0x2E..]);
            descr.used_dirs_count_hi = LittleEndian::read_u16(&b[0x30..]);
            descr.itable_unused_hi = LittleEndian::read_u16(&b[0x32..]);
            descr.exclude_bitmap_hi = LittleEndian::read_u32(&b[0x34..]);
            descr.block_bitmap_csum_hi = LittleEndian::read_u16(&b[0x38..]);
            descr.inode_bitmap_csum_hi = LittleEndian::read_u16(&b[0x3A..]);
            descr._reserved = LittleEndian::read_u32(&b[0x3C..]);
        }

        Ok(descr)
    }

    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut b = [0_u8; DESCRIPTOR_SIZE];
        LittleEndian::write_u32(&mut b[0x00..], self.block_bitmap_lo);
        LittleEndian::write_u32(&mut b[0x04..], self.inode_bitmap_lo);
        LittleEndian::write_u32(&mut b[0x08..], self.inode_table_lo);
        LittleEndian::write_u16(&mut b[0x0C..], self.free_blocks_count_lo);
        LittleEndian::write_u16(&mut b[0x0E..], self.free_inodes_count_lo);
        LittleEndian::write_u16(&mut b[0x10..], self.used_dirs_count_lo);
        LittleEndian::write_u16(&mut b[0x12..], self.flags);
        LittleEndian::write_u32(&mut b[0x14..], self.exclude_bitmap_lo);
        LittleEndian::write_u16(&mut b[0x18..], self.block_bitmap_csum_lo);
        LittleEndian::write_u16(&mut b[0x1A..], self.inode_bitmap_csum_lo);
        LittleEndian::write_u16(&mut b[0x1C..], self.itable_unused_lo);
        LittleEndian::write_u16(&mut b[0x1E..], self.checksum);
        LittleEndian::write_u32(&mut b[0x20..], self.block_bitmap_hi);
        LittleEndian::write_u32(&mut b[0x24..], self.inode_bitmap_hi);
        LittleEndian::write_u32(&mut b[0x28..], self.inode_table_hi);
        LittleEndian::write_u16(&mut b[0x2C..], self.free_blocks_count_hi);
        LittleEndian::write_u16(&mut b[0x2E..], self.free_inodes_count_hi);
        LittleEndian::write_u16(&mut b[0x30..], self.used_dirs_count_hi);
        LittleEndian::write_u16(&mut b[0x32..], self.itable_unused_hi);
        LittleEndian::write_u32(&mut b[0x34..], self.exclude_bitmap_hi);
        LittleEndian::write_u16(&mut b[0x38..], self.block_bitmap_csum_hi);
        LittleEndian::write_u16(&mut b[0x3A..], self.inode_bitmap_csum_hi);
        LittleEndian::write_u32(&mut b[0x3C..], self._reserved);
        b
    }

    pub fn block_bitmap(&self) -> u64 {
        self.block_bitmap_lo as u64 | (self.block_bitmap_hi as u64) << 32
    }

    pub fn inode_bitmap(&self) -> u64 {
        self.inode_bitmap_lo as u64 | (self.inode_bitmap_hi as u64) << 32
    }

    pub fn inode_table(&self) -> u64 {
        self.inode_table_lo as u64 | (self.inode_table_hi as u64) << 32
    }

    pub fn free_blocks_count(&self) -> u32 {
        self.free_blocks_count_lo as u32
            | (self.free_blocks_count_hi as u32) << 16
    }

    pub fn free_inodes_count(&self) -> u32 {
        self.free_inodes_count_lo as u32
            | (self.free_inodes_count_hi as u32) << 16
    }

    pub fn used_dirs_count(&self) -> u32 {
        self.used_dirs_count_lo as u32 | (self.used_dirs_count_hi as u32) << 16
    }

    pub fn itable_unused(&self) -> u32 {
        self.itable_unused_lo as u32 | (self.itable_unused_hi as u32) << 16
    }

    /// Known flag bits; use the raw `flags` field for the rest.
    pub fn bg_flags(&self) -> BgFlags {
        BgFlags::from_bits_truncate(self.flags)
    }

    pub fn inode_table_and_bitmap_uninitialized(&self) -> bool {
        self.flags & BgFlags::INODE_UNINIT.bits() != 0
    }

    pub fn bitmap_uninitialized(&self) -> bool {
        self.flags & BgFlags::BLOCK_UNINIT.bits() != 0
    }

    pub fn inode_table_zeroed(&self) -> bool {
        self.flags & BgFlags::ITABLE_ZEROED.bits() != 0
    }

    pub fn find_descriptor<S, V>(
        haystack: &V,
        offset: Address<S>,
        desc_size: usize,
    ) -> Result<BlockGroupDescriptor, Error>
    where
        S: SectorSize,
        V: Volume<u8, S>,
    {
        let end = offset + Address::from(desc_size);
        let slice = haystack.slice(offset..end).map_err(Into::<Error>::into)?;
        BlockGroupDescriptor::from_bytes_sized(&slice, desc_size)
    }

    pub fn find_descriptor_table<S, V>(
        haystack: &V,
        offset: Address<S>,
        count: usize,
        desc_size: usize,
    ) -> Result<Vec<BlockGroupDescriptor>, Error>
    where
        S: SectorSize,
        V: Volume<u8, S>,
    {
        if desc_size < DESCRIPTOR_SIZE_32 {
            return Err(Error::Decode {
                structure: "block group descriptor table",
                needed: DESCRIPTOR_SIZE_32,
                actual: desc_size,
            });
        }

        let end = offset + Address::from(count * desc_size);
        let table = haystack.slice(offset..end).map_err(Into::<Error>::into)?;

        table
            .chunks(desc_size)
            .map(|raw| BlockGroupDescriptor::from_bytes_sized(raw, desc_size))
            .collect()
    }
}
