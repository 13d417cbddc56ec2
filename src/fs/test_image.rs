//! Synthesises small ext4 images in memory.
//!
//! Layout of every image: 1 KiB blocks, one block group, superblock in block
//! 1, a 64-byte descriptor table in block 2, bitmaps in blocks 3 and 4, the
//! inode table in blocks 5..21 and data from block 21 on. Blocks and inodes
//! are handed out sequentially and never reused.

use byteorder::{ByteOrder, LittleEndian};

use crate::sys::dir_entry::{FileType, DIR_ENTRY_HEADER_SIZE};
use crate::sys::extent::{EXTENT_ENTRY_SIZE, EXTENT_MAGIC};
use crate::sys::inode::INODE_BLOCK_SIZE;
pub use crate::sys::inode::ROOT_INODE;
use crate::sys::superblock::{EXT4_MAGIC, FS_CLEAN};

pub const BLOCK_SIZE: usize = 1024;
pub const BLOCKS_COUNT: u64 = 512;
pub const INODES_COUNT: u32 = 64;
pub const INODE_SIZE: usize = 256;

pub const DIR_MODE: u16 = 0x41ED;
pub const FILE_MODE: u16 = 0x81A4;
pub const EXTENTS_FL: u32 = 0x0008_0000;

const INODE_TABLE: u64 = 5;
const FIRST_DATA_BLOCK: u64 = 21;
const FIRST_FREE_INODE: u32 = 12;

pub struct ImageBuilder {
    image: Vec<u8>,
    next_block: u64,
    next_inode: u32,
    root_entries: Vec<(Vec<u8>, u32, FileType)>,
}

impl ImageBuilder {
    pub fn new() -> ImageBuilder {
        let mut image = vec![0_u8; BLOCKS_COUNT as usize * BLOCK_SIZE];
        {
            let sb = &mut image[1024..2048];
            LittleEndian::write_u32(&mut sb[0x00..], INODES_COUNT);
            LittleEndian::write_u32(&mut sb[0x04..], BLOCKS_COUNT as u32);
            LittleEndian::write_u32(&mut sb[0x14..], 1);
            LittleEndian::write_u32(&mut sb[0x18..], 0);
            LittleEndian::write_u32(&mut sb[0x20..], 8192);
            LittleEndian::write_u32(&mut sb[0x28..], INODES_COUNT);
            LittleEndian::write_u16(&mut sb[0x38..], EXT4_MAGIC);
            LittleEndian::write_u16(&mut sb[0x3A..], FS_CLEAN);
            LittleEndian::write_u32(&mut sb[0x4C..], 1);
            LittleEndian::write_u32(&mut sb[0x54..], 11);
            LittleEndian::write_u16(&mut sb[0x58..], INODE_SIZE as u16);
            // FILETYPE | EXTENTS | 64BIT
            LittleEndian::write_u32(&mut sb[0x60..], 0x2 | 0x40 | 0x80);
            LittleEndian::write_u16(&mut sb[0xFE..], 64);
            sb[0x78..0x81].copy_from_slice(b"ext4-walk");
        }
        {
            let gd = &mut image[2048..2112];
            LittleEndian::write_u32(&mut gd[0x00..], 3);
            LittleEndian::write_u32(&mut gd[0x04..], 4);
            LittleEndian::write_u32(&mut gd[0x08..], INODE_TABLE as u32);
            LittleEndian::write_u16(&mut gd[0x12..], 0x4);
        }
        ImageBuilder {
            image,
            next_block: FIRST_DATA_BLOCK,
            next_inode: FIRST_FREE_INODE,
            root_entries: Vec::new(),
        }
    }

    pub fn alloc_blocks(&mut self, count: u64) -> u64 {
        let start = self.next_block;
        self.next_block += count;
        assert!(self.next_block <= BLOCKS_COUNT, "test image is full");
        start
    }

    pub fn block_mut(&mut self, block: u64) -> &mut [u8] {
        let start = block as usize * BLOCK_SIZE;
        &mut self.image[start..start + BLOCK_SIZE]
    }

    pub fn alloc_inode(&mut self) -> u32 {
        let num = self.next_inode;
        self.next_inode += 1;
        assert!(num <= INODES_COUNT, "inode table is full");
        num
    }

    pub fn write_inode(
        &mut self,
        num: u32,
        mode: u16,
        size: u64,
        flags: u32,
        root: &[u8; INODE_BLOCK_SIZE],
    ) {
        let start = INODE_TABLE as usize * BLOCK_SIZE
            + (num as usize - 1) * INODE_SIZE;
        let raw = &mut self.image[start..start + INODE_SIZE];
        LittleEndian::write_u16(&mut raw[0x00..], mode);
        LittleEndian::write_u32(&mut raw[0x04..], size as u32);
        LittleEndian::write_u16(&mut raw[0x1A..], 1);
        LittleEndian::write_u32(&mut raw[0x20..], flags);
        raw[0x28..0x28 + INODE_BLOCK_SIZE].copy_from_slice(root);
        LittleEndian::write_u32(&mut raw[0x6C..], (size >> 32) as u32);
    }

    /// Overrides the byte size recorded in inode `num`.
    pub fn set_size(&mut self, num: u32, size: u64) {
        let start = INODE_TABLE as usize * BLOCK_SIZE
            + (num as usize - 1) * INODE_SIZE;
        let raw = &mut self.image[start..start + INODE_SIZE];
        LittleEndian::write_u32(&mut raw[0x04..], size as u32);
        LittleEndian::write_u32(&mut raw[0x6C..], (size >> 32) as u32);
    }

    pub fn add_inode_with_root(
        &mut self,
        mode: u16,
        size: u64,
        flags: u32,
        root: &[u8; INODE_BLOCK_SIZE],
    ) -> u32 {
        let num = self.alloc_inode();
        self.write_inode(num, mode, size, flags, root);
        num
    }

    /// Copies `data` into freshly allocated blocks and returns
    /// `(first block, block count)`.
    fn store(&mut self, data: &[u8]) -> (u64, u16) {
        let blocks = (data.len() + BLOCK_SIZE - 1) / BLOCK_SIZE;
        if blocks == 0 {
            return (0, 0);
        }
        let start = self.alloc_blocks(blocks as u64);
        for (i, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
            self.block_mut(start + i as u64)[..chunk.len()].copy_from_slice(chunk);
        }
        (start, blocks as u16)
    }

    /// A regular file whose data is one contiguous extent.
    pub fn add_file(&mut self, contents: &[u8]) -> u32 {
        let (start, blocks) = self.store(contents);
        let extents = if blocks == 0 {
            vec![]
        } else {
            vec![(0, blocks, start)]
        };
        let root = inline_root(&extent_leaf(INODE_BLOCK_SIZE, &extents));
        self.add_inode_with_root(FILE_MODE, contents.len() as u64, EXTENTS_FL, &root)
    }

    /// A regular file of `size` bytes with data only at the given logical
    /// blocks; everything else is a hole.
    pub fn add_file_with_extents(&mut self, size: u64, chunks: &[(u32, &[u8])]) -> u32 {
        let extents: Vec<_> = chunks
            .iter()
            .map(|&(logical, data)| {
                let (start, blocks) = self.store(data);
                (logical, blocks, start)
            })
            .collect();
        let root = inline_root(&extent_leaf(INODE_BLOCK_SIZE, &extents));
        self.add_inode_with_root(FILE_MODE, size, EXTENTS_FL, &root)
    }

    /// A regular file mapped one block per extent through a tree of the
    /// given depth. Leaves and index blocks hold two entries each.
    pub fn add_deep_file(&mut self, contents: &[u8], depth: u16) -> u32 {
        let mut extents = Vec::new();
        for (i, chunk) in contents.chunks(BLOCK_SIZE).enumerate() {
            let (start, _) = self.store(chunk);
            extents.push((i as u32, 1, start));
        }

        let root = if depth == 0 {
            extent_leaf(INODE_BLOCK_SIZE, &extents)
        } else {
            let mut level: Vec<(u32, u64)> = extents
                .chunks(2)
                .map(|group| {
                    let node = extent_leaf(BLOCK_SIZE, group);
                    (group[0].0, self.store(&node).0)
                })
                .collect();
            for node_depth in 1..depth {
                level = level
                    .chunks(2)
                    .map(|group| {
                        let node = extent_index(BLOCK_SIZE, node_depth, group);
                        (group[0].0, self.store(&node).0)
                    })
                    .collect();
            }
            extent_index(INODE_BLOCK_SIZE, depth, &level)
        };
        self.add_inode_with_root(
            FILE_MODE,
            contents.len() as u64,
            EXTENTS_FL,
            &inline_root(&root),
        )
    }

    /// A directory holding `.`, `..` (the root) and `entries`.
    pub fn add_dir(&mut self, entries: &[(&str, u32, FileType)]) -> u32 {
        let num = self.alloc_inode();
        let mut all: Vec<(Vec<u8>, u32, FileType)> = vec![
            (b".".to_vec(), num, FileType::Directory),
            (b"..".to_vec(), ROOT_INODE, FileType::Directory),
        ];
        all.extend(
            entries
                .iter()
                .map(|&(name, inode, ty)| (name.as_bytes().to_vec(), inode, ty)),
        );
        self.write_dir(num, &dir_blocks(&all));
        num
    }

    /// A directory whose blocks the caller laid out by hand.
    pub fn add_dir_raw(&mut self, blocks: &[Vec<u8>]) -> u32 {
        let num = self.alloc_inode();
        self.write_dir(num, blocks);
        num
    }

    pub fn add_root_entry(&mut self, name: &[u8], inode: u32, ty: FileType) {
        self.root_entries.push((name.to_vec(), inode, ty));
    }

    fn write_dir(&mut self, num: u32, blocks: &[Vec<u8>]) {
        let data: Vec<u8> = blocks.concat();
        let (start, count) = self.store(&data);
        let root = inline_root(&extent_leaf(INODE_BLOCK_SIZE, &[(0, count, start)]));
        self.write_inode(num, DIR_MODE, data.len() as u64, EXTENTS_FL, &root);
    }

    /// Writes the root directory and hands out the image.
    pub fn finish(mut self) -> Vec<u8> {
        let mut entries = vec![
            (b".".to_vec(), ROOT_INODE, FileType::Directory),
            (b"..".to_vec(), ROOT_INODE, FileType::Directory),
        ];
        entries.append(&mut self.root_entries);
        let blocks = dir_blocks(&entries);
        self.write_dir(ROOT_INODE, &blocks);
        self.image
    }
}

/// An extent tree leaf of `size` bytes; each entry is
/// `(logical start, raw length, physical start)`.
pub fn extent_leaf(size: usize, extents: &[(u32, u16, u64)]) -> Vec<u8> {
    let mut node = extent_header(size, extents.len(), 0);
    for (i, &(logical, len, physical)) in extents.iter().enumerate() {
        let at = EXTENT_ENTRY_SIZE * (i + 1);
        LittleEndian::write_u32(&mut node[at..], logical);
        LittleEndian::write_u16(&mut node[at + 4..], len);
        LittleEndian::write_u16(&mut node[at + 6..], (physical >> 32) as u16);
        LittleEndian::write_u32(&mut node[at + 8..], physical as u32);
    }
    node
}

/// An extent tree index node of `size` bytes; each entry is
/// `(logical key, child block)`.
pub fn extent_index(size: usize, depth: u16, indexes: &[(u32, u64)]) -> Vec<u8> {
    let mut node = extent_header(size, indexes.len(), depth);
    for (i, &(logical, child)) in indexes.iter().enumerate() {
        let at = EXTENT_ENTRY_SIZE * (i + 1);
        LittleEndian::write_u32(&mut node[at..], logical);
        LittleEndian::write_u32(&mut node[at + 4..], child as u32);
        LittleEndian::write_u16(&mut node[at + 8..], (child >> 32) as u16);
    }
    node
}

fn extent_header(size: usize, entries: usize, depth: u16) -> Vec<u8> {
    let max = (size - EXTENT_ENTRY_SIZE) / EXTENT_ENTRY_SIZE;
    assert!(entries <= max, "too many entries for one node");
    let mut node = vec![0_u8; size];
    LittleEndian::write_u16(&mut node[0..], EXTENT_MAGIC);
    LittleEndian::write_u16(&mut node[2..], entries as u16);
    LittleEndian::write_u16(&mut node[4..], max as u16);
    LittleEndian::write_u16(&mut node[6..], depth);
    node
}

pub fn inline_root(node: &[u8]) -> [u8; INODE_BLOCK_SIZE] {
    let mut root = [0_u8; INODE_BLOCK_SIZE];
    root.copy_from_slice(&node[..INODE_BLOCK_SIZE]);
    root
}

/// Writes one directory record at `at` in `block`.
pub fn dir_entry(
    block: &mut [u8],
    at: usize,
    inode: u32,
    rec_len: u16,
    name: &[u8],
    ty: FileType,
) {
    LittleEndian::write_u32(&mut block[at..], inode);
    LittleEndian::write_u16(&mut block[at + 4..], rec_len);
    block[at + 6] = name.len() as u8;
    block[at + 7] = ty.into_raw();
    let name_at = at + DIR_ENTRY_HEADER_SIZE;
    block[name_at..name_at + name.len()].copy_from_slice(name);
}

/// Packs entries into directory blocks the way mke2fs does: records are
/// 4-byte aligned and the last one in each block stretches to its end.
pub fn dir_blocks(entries: &[(Vec<u8>, u32, FileType)]) -> Vec<Vec<u8>> {
    let mut blocks = Vec::new();
    let mut block = vec![0_u8; BLOCK_SIZE];
    let mut offset = 0;
    let mut last = 0;

    for &(ref name, inode, ty) in entries {
        let rec_len = (DIR_ENTRY_HEADER_SIZE + name.len() + 3) & !3;
        if offset + rec_len > BLOCK_SIZE {
            LittleEndian::write_u16(&mut block[last + 4..], (BLOCK_SIZE - last) as u16);
            blocks.push(block);
            block = vec![0_u8; BLOCK_SIZE];
            offset = 0;
        }
        dir_entry(&mut block, offset, inode, rec_len as u16, name, ty);
        last = offset;
        offset += rec_len;
    }
    LittleEndian::write_u16(&mut block[last + 4..], (BLOCK_SIZE - last) as u16);
    blocks.push(block);
    blocks
}
