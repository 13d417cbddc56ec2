use crate::error::Error;
use crate::sector::SectorSize;
use crate::sys::extent::ExtentNode;
use crate::sys::inode::INODE_BLOCK_SIZE;
use crate::volume::Volume;

use super::sync::Inode;
use super::{Ext4, HolePolicy};

/// Where a logical block of an inode lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    Mapped {
        physical: u64,
        /// Blocks left in the extent, counting this one
        remaining: u64,
        unwritten: bool,
    },
    /// No extent covers the block. `remaining` counts the blocks up to the
    /// next mapped key, when the tree has one.
    Hole { remaining: Option<u64> },
}

/// Resolves logical offsets of one inode through its extent tree.
///
/// Nothing is cached: every lookup starts again from the inline root and
/// reads the index and leaf blocks it needs fresh from the volume.
pub struct ExtentNavigator<S: SectorSize, V: Volume<u8, S>> {
    inode: Inode<S, V>,
}

impl<S: SectorSize, V: Volume<u8, S>> ExtentNavigator<S, V> {
    pub fn new(inode: Inode<S, V>) -> ExtentNavigator<S, V> {
        ExtentNavigator { inode }
    }

    pub fn inode(&self) -> &Inode<S, V> {
        &self.inode
    }

    /// Maps logical block `block` without reading any data.
    pub fn resolve(&self, block: u64) -> Result<Mapping, Error> {
        self.check_mapped()?;
        let fs = self.inode.fs().inner();
        resolve(&fs, self.inode.num(), self.inode.extent_root(), block)
    }

    /// Reads from logical byte `offset` up to the end of its block, clamped
    /// to the inode size. Returns the bytes and their count, which is 0 only
    /// at or past the end of the inode.
    pub fn read(&self, offset: u64) -> Result<(Vec<u8>, usize), Error> {
        self.check_mapped()?;
        let num = self.inode.num();
        let size = self.inode.size();
        if offset >= size {
            return Ok((Vec::new(), 0));
        }

        let fs = self.inode.fs().inner();
        let block_size = fs.block_size() as u64;
        let block = offset / block_size;
        let in_block = (offset % block_size) as usize;
        let count = (block_size - in_block as u64).min(size - offset) as usize;

        match resolve(&fs, num, self.inode.extent_root(), block)? {
            Mapping::Mapped {
                unwritten: true, ..
            } => {
                trace!("inode {}: block {} is unwritten", num, block);
                Ok((vec![0; count], count))
            }
            Mapping::Mapped { physical, .. } => {
                trace!("inode {}: block {} -> {}", num, block, physical);
                let data = fs.read_block(physical)?;
                Ok((data[in_block..in_block + count].to_vec(), count))
            }
            Mapping::Hole { .. } => match fs.options().hole_policy {
                HolePolicy::ZeroFill => {
                    trace!("inode {}: block {} is a hole", num, block);
                    Ok((vec![0; count], count))
                }
                HolePolicy::Error => {
                    Err(Error::ExtentNotFound { inode: num, block })
                }
            },
        }
    }

    fn check_mapped(&self) -> Result<(), Error> {
        let inode = self.inode.num();
        if self.inode.raw().has_inline_data() {
            Err(Error::InlineData { inode })
        } else if self.inode.uses_extents() {
            Ok(())
        } else {
            Err(Error::NotExtentMapped { inode })
        }
    }
}

/// Descends from the inline root to the leaf covering `block`. The caller
/// holds the filesystem lock for the whole descent.
fn resolve<S: SectorSize, V: Volume<u8, S>>(
    fs: &Ext4<S, V>,
    inode: u32,
    root: &[u8; INODE_BLOCK_SIZE],
    block: u64,
) -> Result<Mapping, Error> {
    let corrupt = |reason| Error::CorruptExtentTree { inode, reason };

    let (header, mut node) = ExtentNode::parse(root, inode)?;
    let max_depth = fs.options().max_extent_depth;
    if header.depth > max_depth {
        warn!(
            "inode {}: extent tree depth {} exceeds {}",
            inode, header.depth, max_depth
        );
        return Err(corrupt("tree deeper than allowed"));
    }

    let mut depth = header.depth;
    // first logical block past the subtree being searched
    let mut bound: Option<u64> = None;

    loop {
        let position = node.search(block);
        let next = position.map_or(0, |position| position + 1);

        match node {
            ExtentNode::Leaf(extents) => {
                let next = extents
                    .get(next)
                    .map(|extent| extent.logical_start as u64)
                    .or(bound);
                return Ok(match position.map(|position| extents[position]) {
                    Some(extent) if extent.contains(block) => Mapping::Mapped {
                        physical: extent.physical_start
                            + (block - extent.logical_start as u64),
                        remaining: extent.logical_end() - block,
                        unwritten: extent.is_unwritten(),
                    },
                    _ => Mapping::Hole {
                        remaining: next.map(|next| next - block),
                    },
                });
            }
            ExtentNode::Index(indexes) => {
                let next = indexes
                    .get(next)
                    .map(|index| index.logical_start as u64)
                    .or(bound);
                let index = match position {
                    Some(position) => indexes[position],
                    None => {
                        return Ok(Mapping::Hole {
                            remaining: next.map(|next| next - block),
                        })
                    }
                };

                trace!(
                    "inode {}: depth {} index {} -> block {}",
                    inode,
                    depth,
                    index.logical_start,
                    index.leaf
                );
                let raw = fs.read_block(index.leaf)?;
                let (child_header, child) = ExtentNode::parse(&raw, inode)?;
                if child_header.depth != depth - 1 {
                    return Err(corrupt("child depth does not decrease by one"));
                }
                depth = child_header.depth;
                bound = next;
                node = child;
            }
        }
    }
}
