use std::fmt::{self, Debug, Display, LowerHex};
use std::marker::PhantomData;
use std::ops::{Add, Sub};

pub trait SectorSize: Clone + Copy + PartialOrd {
    // log_sector_size = log_2(sector_size)
    const LOG_SIZE: u32;
    const SIZE: usize = 1 << Self::LOG_SIZE;
    const OFFSET_MASK: u64 = (Self::SIZE - 1) as u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size512;
impl SectorSize for Size512 {
    const LOG_SIZE: u32 = 9;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size1024;
impl SectorSize for Size1024 {
    const LOG_SIZE: u32 = 10;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size2048;
impl SectorSize for Size2048 {
    const LOG_SIZE: u32 = 11;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size4096;
impl SectorSize for Size4096 {
    const LOG_SIZE: u32 = 12;
}

/// Byte address on a volume, split into a sector number and an offset inside
/// that sector. Sector numbers are 64-bit so every ext4 block number fits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address<S: SectorSize> {
    sector: u64,
    offset: u32,
    _phantom: PhantomData<S>,
}

impl<S: SectorSize> Address<S> {
    pub fn new(sector: u64, offset: u64) -> Address<S> {
        let sector = sector + (offset >> S::LOG_SIZE);
        let offset = (offset & S::OFFSET_MASK) as u32;
        Address {
            sector,
            offset,
            _phantom: PhantomData,
        }
    }

    /// Address of byte `offset` within filesystem block `block`, for a block
    /// size of `1 << log_block_size` bytes. `None` if the byte index does not
    /// fit in 64 bits.
    pub fn with_block_size(
        block: u64,
        offset: u64,
        log_block_size: u32,
    ) -> Option<Address<S>> {
        if log_block_size >= 64 || block > u64::MAX >> log_block_size {
            return None;
        }
        (block << log_block_size).checked_add(offset).map(Address::from)
    }

    pub fn into_index(&self) -> u64 {
        (self.sector << S::LOG_SIZE) + self.offset as u64
    }

    pub const fn sector_size(&self) -> usize {
        S::SIZE
    }

    pub const fn log_sector_size(&self) -> u32 {
        S::LOG_SIZE
    }

    pub fn sector(&self) -> u64 {
        self.sector
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl<S: SectorSize> Debug for Address<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = format!("Address<{}>", S::SIZE);
        f.debug_struct(&name)
            .field("sector", &self.sector)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<S: SectorSize> Display for Address<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.sector, self.offset)
    }
}

impl<S: SectorSize> LowerHex for Address<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}:{:x}", self.sector, self.offset)
    }
}

impl<S: SectorSize> From<u64> for Address<S> {
    fn from(idx: u64) -> Address<S> {
        Address::new(idx >> S::LOG_SIZE, idx & S::OFFSET_MASK)
    }
}

impl<S: SectorSize> From<usize> for Address<S> {
    fn from(idx: usize) -> Address<S> {
        Address::from(idx as u64)
    }
}

impl<S: SectorSize> Add for Address<S> {
    type Output = Address<S>;
    fn add(self, rhs: Address<S>) -> Address<S> {
        Address::new(
            self.sector + rhs.sector,
            self.offset as u64 + rhs.offset as u64,
        )
    }
}

impl<S: SectorSize> Sub for Address<S> {
    type Output = Address<S>;
    fn sub(self, rhs: Address<S>) -> Address<S> {
        Address::from(self.into_index() - rhs.into_index())
    }
}
