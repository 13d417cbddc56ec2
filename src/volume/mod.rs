use std::borrow::{Cow, ToOwned};
use std::ops::{Deref, Range};

use crate::error::Error;
use crate::sector::{Address, SectorSize};

pub mod size;
use self::size::Size;

/// Read-only random access to the bytes of a filesystem image.
///
/// Implementations never write. A volume is shared by every inode opened on
/// the same filesystem, so reads happen strictly one after another.
pub trait Volume<T: Clone, S: SectorSize> {
    type Error: Into<Error>;

    fn size(&self) -> Size<S>;

    fn slice<'a>(
        &'a self,
        range: Range<Address<S>>,
    ) -> Result<VolumeSlice<'a, T, S>, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Hash)]
pub struct VolumeSlice<'a, T: 'a + Clone, S: SectorSize> {
    inner: Cow<'a, [T]>,
    index: Address<S>,
}

impl<T: Clone, S: SectorSize> VolumeSlice<'static, T, S> {
    pub fn new_owned(
        inner: <[T] as ToOwned>::Owned,
        index: Address<S>,
    ) -> VolumeSlice<'static, T, S> {
        VolumeSlice {
            inner: Cow::Owned(inner),
            index,
        }
    }
}

impl<'a, T: Clone, S: SectorSize> VolumeSlice<'a, T, S> {
    pub fn new(inner: &'a [T], index: Address<S>) -> VolumeSlice<'a, T, S> {
        VolumeSlice {
            inner: Cow::Borrowed(inner),
            index,
        }
    }

    pub fn address(&self) -> Address<S> {
        self.index
    }

    pub fn into_vec(self) -> Vec<T> {
        self.inner.into_owned()
    }
}

impl<'a, T: Clone, S: SectorSize> AsRef<[T]> for VolumeSlice<'a, T, S> {
    fn as_ref(&self) -> &[T] {
        self.inner.as_ref()
    }
}

impl<'a, T: Clone, S: SectorSize> Deref for VolumeSlice<'a, T, S> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

macro_rules! impl_slice {
    (@inner $volume:ty $( , $lt:lifetime )* ) => {
        impl<$( $lt, )* T: Clone, S: SectorSize> Volume<T, S>
            for $volume
        {
            type Error = Error;

            fn size(&self) -> Size<S> {
                Size::Bounded(
                    Address::from(<Self as AsRef<[T]>>::as_ref(self).len())
                )
            }

            fn slice<'a>(
                &'a self,
                range: Range<Address<S>>,
            ) -> Result<VolumeSlice<'a, T, S>, Self::Error> {
                if range.start <= range.end && self.size().contains(range.end) {
                    let index = range.start;
                    let range = range.start.into_index() as usize
                        ..range.end.into_index() as usize;
                    Ok(VolumeSlice::new(
                        &<Self as AsRef<[T]>>::as_ref(self)[range],
                        index,
                    ))
                } else {
                    Err(Error::AddressOutOfBounds {
                        sector: range.end.sector(),
                        offset: range.end.offset(),
                        size: range.end.sector_size(),
                    })
                }
            }
        }
    };
    ($volume:ty) => {
        impl_slice!(@inner $volume);
    };
    ($volume:ty $( , $lt:lifetime )* ) => {
        impl_slice!(@inner $volume $( , $lt )* );
    };
}

impl_slice!(&'b [T], 'b);
impl_slice!(Vec<T>);
impl_slice!(Box<[T]>);

mod file {
    use std::cell::RefCell;
    use std::io::{self, Read, Seek, SeekFrom};
    use std::ops::Range;

    use crate::sector::{Address, SectorSize};

    use super::size::Size;
    use super::{Volume, VolumeSlice};

    /// Any seekable reader (an image file, a block device, a `Cursor`) can
    /// back a filesystem. The `RefCell` gives the shared, read-only volume
    /// the mutable access seeking needs.
    impl<S: SectorSize, R: Read + Seek> Volume<u8, S> for RefCell<R> {
        type Error = io::Error;

        fn size(&self) -> Size<S> {
            let mut inner = self.borrow_mut();
            let len = inner.seek(SeekFrom::End(0));
            match len {
                Ok(len) => Size::Bounded(Address::from(len)),
                Err(_) => Size::Unbounded,
            }
        }

        fn slice<'a>(
            &'a self,
            range: Range<Address<S>>,
        ) -> Result<VolumeSlice<'a, u8, S>, Self::Error> {
            let index = range.start;
            let len = range
                .end
                .into_index()
                .checked_sub(index.into_index())
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "reversed range")
                })?;
            let mut vec = vec![0_u8; len as usize];
            let mut inner = self.borrow_mut();
            inner.seek(SeekFrom::Start(index.into_index()))?;
            inner.read_exact(&mut vec[..])?;
            Ok(VolumeSlice::new_owned(vec, index))
        }
    }
}
