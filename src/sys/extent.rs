use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;

/// `eh_magic` of every extent tree node
pub const EXTENT_MAGIC: u16 = 0xF30A;
/// Size of the node header and of each entry following it
pub const EXTENT_ENTRY_SIZE: usize = 12;
/// Deepest tree the kernel will build
pub const MAX_EXTENT_DEPTH: u16 = 5;
/// Extents longer than this are unwritten (preallocated, reads as zeros)
pub const EXT_INIT_MAX_LEN: u16 = 1 << 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentHeader {
    pub magic: u16,
    pub entries: u16,
    pub max_entries: u16,
    pub depth: u16,
    pub generation: u32,
}

/// A leaf entry: `len` logical blocks starting at `logical_start` live in the
/// physical blocks starting at `physical_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub logical_start: u32,
    pub raw_len: u16,
    pub physical_start: u64,
}

impl Extent {
    pub fn is_unwritten(&self) -> bool {
        self.raw_len > EXT_INIT_MAX_LEN
    }

    pub fn len(&self) -> u32 {
        if self.raw_len <= EXT_INIT_MAX_LEN {
            self.raw_len as u32
        } else {
            (self.raw_len - EXT_INIT_MAX_LEN) as u32
        }
    }

    /// First logical block past the extent.
    pub fn logical_end(&self) -> u64 {
        self.logical_start as u64 + self.len() as u64
    }

    pub fn contains(&self, block: u64) -> bool {
        block >= self.logical_start as u64 && block < self.logical_end()
    }
}

/// An interior entry: the subtree stored in block `leaf` covers logical
/// blocks from `logical_start` up to the next index entry's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentIndex {
    pub logical_start: u32,
    pub leaf: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtentNode {
    Leaf(Vec<Extent>),
    Index(Vec<ExtentIndex>),
}

impl ExtentNode {
    /// Decodes one tree node from `bytes` (the 60-byte inline root or a whole
    /// on-disk block). `inode` only labels errors.
    pub fn parse(
        bytes: &[u8],
        inode: u32,
    ) -> Result<(ExtentHeader, ExtentNode), Error> {
        let corrupt = |reason| Error::CorruptExtentTree { inode, reason };

        if bytes.len() < EXTENT_ENTRY_SIZE {
            return Err(corrupt("node shorter than its header"));
        }

        let header = ExtentHeader {
            magic: LittleEndian::read_u16(&bytes[0..]),
            entries: LittleEndian::read_u16(&bytes[2..]),
            max_entries: LittleEndian::read_u16(&bytes[4..]),
            depth: LittleEndian::read_u16(&bytes[6..]),
            generation: LittleEndian::read_u32(&bytes[8..]),
        };

        if header.magic != EXTENT_MAGIC {
            return Err(corrupt("bad magic"));
        }
        if header.entries > header.max_entries {
            return Err(corrupt("more entries than the node holds"));
        }
        let capacity = (bytes.len() - EXTENT_ENTRY_SIZE) / EXTENT_ENTRY_SIZE;
        if header.max_entries as usize > capacity {
            return Err(corrupt("node capacity exceeds its size"));
        }

        let entries = bytes[EXTENT_ENTRY_SIZE..]
            .chunks(EXTENT_ENTRY_SIZE)
            .take(header.entries as usize);

        let node = if header.depth == 0 {
            ExtentNode::Leaf(
                entries
                    .map(|raw| Extent {
                        logical_start: LittleEndian::read_u32(&raw[0..]),
                        raw_len: LittleEndian::read_u16(&raw[4..]),
                        physical_start: (LittleEndian::read_u16(&raw[6..])
                            as u64)
                            << 32
                            | LittleEndian::read_u32(&raw[8..]) as u64,
                    })
                    .collect(),
            )
        } else {
            ExtentNode::Index(
                entries
                    .map(|raw| ExtentIndex {
                        logical_start: LittleEndian::read_u32(&raw[0..]),
                        leaf: LittleEndian::read_u32(&raw[4..]) as u64
                            | (LittleEndian::read_u16(&raw[8..]) as u64) << 32,
                    })
                    .collect(),
            )
        };

        if !node.is_sorted() {
            return Err(corrupt("entries out of order"));
        }

        Ok((header, node))
    }

    pub fn len(&self) -> usize {
        match *self {
            ExtentNode::Leaf(ref extents) => extents.len(),
            ExtentNode::Index(ref indexes) => indexes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keys(&self) -> Vec<u32> {
        match *self {
            ExtentNode::Leaf(ref extents) => {
                extents.iter().map(|e| e.logical_start).collect()
            }
            ExtentNode::Index(ref indexes) => {
                indexes.iter().map(|i| i.logical_start).collect()
            }
        }
    }

    fn is_sorted(&self) -> bool {
        self.keys().windows(2).all(|pair| pair[0] < pair[1])
    }

    /// Position of the last entry whose key is `<= block`, if any.
    pub fn search(&self, block: u64) -> Option<usize> {
        let keys = self.keys();
        let after = keys.partition_point(|&key| key as u64 <= block);
        after.checked_sub(1)
    }
}
