use std::cmp::Ordering;
use std::fmt::{self, Display};

use crate::sector::{Address, SectorSize};

#[derive(Clone, Copy, Debug, Hash)]
pub enum Size<S: SectorSize> {
    Unbounded,
    Bounded(Address<S>),
}

impl<S: SectorSize> Size<S> {
    pub fn try_len(&self) -> Option<Address<S>> {
        match *self {
            Size::Unbounded => None,
            Size::Bounded(n) => Some(n),
        }
    }

    pub fn is_bounded(&self) -> bool {
        match *self {
            Size::Unbounded => false,
            Size::Bounded(_) => true,
        }
    }

    /// Whether a read ending at `end` stays within the volume.
    pub fn contains(&self, end: Address<S>) -> bool {
        match *self {
            Size::Unbounded => true,
            Size::Bounded(n) => end <= n,
        }
    }
}

impl<S: SectorSize> Display for Size<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Size::Unbounded => write!(f, "Unbounded"),
            Size::Bounded(n) => write!(f, "Bounded({})", n),
        }
    }
}

impl<S: SectorSize> PartialEq for Size<S> {
    fn eq(&self, rhs: &Self) -> bool {
        match (self, rhs) {
            (&Size::Bounded(ref a), &Size::Bounded(ref b)) => a.eq(b),
            _ => false,
        }
    }
}

impl<S: SectorSize> PartialOrd<Address<S>> for Size<S> {
    fn partial_cmp(&self, rhs: &Address<S>) -> Option<Ordering> {
        match *self {
            Size::Unbounded => Some(Ordering::Greater),
            Size::Bounded(ref n) => n.partial_cmp(rhs),
        }
    }
}

impl<S: SectorSize> PartialEq<Address<S>> for Size<S> {
    fn eq(&self, rhs: &Address<S>) -> bool {
        match *self {
            Size::Unbounded => false,
            Size::Bounded(ref n) => n.eq(rhs),
        }
    }
}
