use crate::error::Error;
use crate::sector::{Address, SectorSize};
use crate::sys::block_group::BlockGroupDescriptor;
use crate::sys::inode::Inode as RawInode;
use crate::sys::superblock::{FeaturesIncompat, Superblock, SUPERBLOCK_OFFSET};
use crate::volume::Volume;

pub mod dir;
pub mod extent;
pub mod reader;
pub mod sync;
pub mod walk;

#[cfg(test)]
pub(crate) mod test_image;

pub(crate) struct Struct<T, S: SectorSize> {
    pub inner: T,
    pub offset: Address<S>,
}

impl<T, S: SectorSize> From<(T, Address<S>)> for Struct<T, S> {
    #[inline]
    fn from((inner, offset): (T, Address<S>)) -> Struct<T, S> {
        Struct { inner, offset }
    }
}

/// What reading an unmapped logical block produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolePolicy {
    /// Sparse regions read as zero bytes, the way the kernel serves them
    ZeroFill,
    /// Sparse regions fail with `Error::ExtentNotFound`
    Error,
}

impl Default for HolePolicy {
    fn default() -> HolePolicy {
        HolePolicy::ZeroFill
    }
}

/// Knobs for reading inode payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub hole_policy: HolePolicy,
    /// Extent trees whose root claims more levels than this are corrupt
    pub max_extent_depth: u16,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            hole_policy: HolePolicy::default(),
            max_extent_depth: crate::sys::extent::MAX_EXTENT_DEPTH,
        }
    }
}

/// Safe wrapper for raw sys structs
pub struct Ext4<S: SectorSize, V: Volume<u8, S>> {
    pub(crate) volume: V,
    pub(crate) superblock: Struct<Superblock, S>,
    pub(crate) block_groups: Struct<Vec<BlockGroupDescriptor>, S>,
    pub(crate) options: Options,
}

impl<S: SectorSize, V: Volume<u8, S>> Ext4<S, V> {
    pub fn new(volume: V) -> Result<Ext4<S, V>, Error> {
        Ext4::with_options(volume, Options::default())
    }

    pub fn with_options(volume: V, options: Options) -> Result<Ext4<S, V>, Error> {
        let superblock = Struct::from(Superblock::find(&volume)?);
        let block_groups_offset = descriptor_table_address(&superblock.inner)?;
        let block_groups_count = superblock
            .inner
            .block_group_count()
            .map(|count| count as usize)
            .map_err(|(a, b)| Error::BadBlockGroupCount {
                by_blocks: a,
                by_inodes: b,
            })?;
        let block_groups = BlockGroupDescriptor::find_descriptor_table(
            &volume,
            block_groups_offset,
            block_groups_count,
            superblock.inner.descriptor_size(),
        )?;
        let block_groups = Struct::from((block_groups, block_groups_offset));

        let fs = Ext4 {
            volume,
            superblock,
            block_groups,
            options,
        };
        fs.check_features();
        debug!(
            "opened ext4 volume: {} byte blocks, {} groups, {} inodes",
            fs.block_size(),
            block_groups_count,
            fs.total_inodes_count(),
        );
        Ok(fs)
    }

    /// Builds a filesystem from a superblock and a single descriptor the
    /// caller already decoded. Only inodes of block group 0 can be opened.
    pub fn with_descriptor(
        volume: V,
        superblock: Superblock,
        descriptor: BlockGroupDescriptor,
    ) -> Result<Ext4<S, V>, Error> {
        superblock.validate()?;
        let offset = descriptor_table_address(&superblock)?;
        let fs = Ext4 {
            volume,
            superblock: Struct::from((superblock, Address::from(SUPERBLOCK_OFFSET))),
            block_groups: Struct::from((vec![descriptor], offset)),
            options: Options::default(),
        };
        fs.check_features();
        Ok(fs)
    }

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    pub fn options(&self) -> Options {
        self.options
    }

    fn check_features(&self) {
        let superblock = &self.superblock.inner;
        let unknown = superblock.unknown_incompat();
        if unknown != 0 {
            warn!("unknown incompatible features {:#x}", unknown);
        }
        let incompat = superblock.features_incompat();
        if !incompat.contains(FeaturesIncompat::EXTENTS) {
            warn!("volume does not use extents; only extent-mapped inodes can be read");
        }
        if incompat.contains(FeaturesIncompat::RECOVER) {
            warn!("journal needs recovery; metadata may be stale");
        }
        if superblock.has_errors() {
            warn!("volume has recorded errors");
        } else if !superblock.is_clean() {
            warn!("volume was not cleanly unmounted");
        }
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock.inner
    }

    pub fn superblock_address(&self) -> Address<S> {
        self.superblock.offset
    }

    pub fn descriptor_table_address(&self) -> Address<S> {
        self.block_groups.offset
    }

    pub fn descriptor(&self, group: usize) -> Option<&BlockGroupDescriptor> {
        self.block_groups.inner.get(group)
    }

    pub fn version(&self) -> (u32, u16) {
        (
            self.superblock.inner.rev_major,
            self.superblock.inner.rev_minor,
        )
    }

    pub fn inode_size(&self) -> usize {
        self.superblock.inner.inode_size() as usize
    }

    pub fn inodes_count(&self) -> usize {
        self.superblock.inner.inodes_per_group as _
    }

    pub fn total_inodes_count(&self) -> usize {
        self.superblock.inner.inodes_count as _
    }

    pub fn block_group_count(&self) -> usize {
        self.block_groups.inner.len()
    }

    pub fn total_block_count(&self) -> u64 {
        self.superblock.inner.blocks_count
    }

    pub fn block_size(&self) -> usize {
        self.superblock.inner.block_size()
    }

    pub fn log_block_size(&self) -> u32 {
        self.superblock.inner.log_block_bytes()
    }

    pub fn sector_size(&self) -> usize {
        S::SIZE
    }

    pub fn log_sector_size(&self) -> u32 {
        S::LOG_SIZE
    }

    /// Byte address of `offset` within `block`. Blocks past the end of the
    /// volume, or whose byte index overflows, are out of bounds.
    fn block_address(&self, block: u64, offset: u64) -> Result<Address<S>, Error> {
        let out_of_bounds = Error::AddressOutOfBounds {
            sector: block,
            offset: 0,
            size: self.block_size(),
        };
        if block >= self.total_block_count() {
            return Err(out_of_bounds);
        }
        Address::with_block_size(block, offset, self.log_block_size())
            .ok_or(out_of_bounds)
    }

    /// Reads one whole filesystem block.
    pub fn read_block(&self, block: u64) -> Result<Vec<u8>, Error> {
        let start = self.block_address(block, 0)?;
        let end = self.block_address(block, self.block_size() as u64)?;
        let slice = self.volume.slice(start..end).map_err(Into::<Error>::into)?;
        Ok(slice.into_vec())
    }

    /// Locates and decodes inode `num` (1-based) through the descriptor of
    /// its block group.
    pub fn read_inode(&self, num: u32) -> Result<(RawInode, Address<S>), Error> {
        if num == 0 || num as usize > self.total_inodes_count() {
            return Err(Error::InodeOutOfRange { inode: num });
        }

        let inodes_per_group = self.inodes_count();
        let block_group = (num as usize - 1) / inodes_per_group;
        let index = (num as usize - 1) % inodes_per_group;
        let descriptor = self
            .descriptor(block_group)
            .ok_or(Error::InodeOutOfRange { inode: num })?;

        let inode_table = descriptor.inode_table();
        let inode_size = self.inode_size();
        let offset = self.block_address(inode_table, (index * inode_size) as u64)?;
        let end =
            self.block_address(inode_table, ((index + 1) * inode_size) as u64)?;
        let raw = self.volume.slice(offset..end).map_err(Into::<Error>::into)?;
        let inode = RawInode::from_bytes(&raw)?;
        trace!("inode {} at {}: {:?}", num, offset, inode);
        Ok((inode, offset))
    }
}

fn descriptor_table_address<S: SectorSize>(
    superblock: &Superblock,
) -> Result<Address<S>, Error> {
    Address::with_block_size(
        superblock.descriptor_table_block(),
        0,
        superblock.log_block_bytes(),
    )
    .ok_or(Error::InvalidSuperblock("descriptor table out of range"))
}
