use std::fmt::{self, Debug};
use std::sync::Arc;

use spin::{Mutex, MutexGuard};

use crate::error::Error;
use crate::sector::{Address, SectorSize};
use crate::sys::inode::{Inode as RawInode, INODE_BLOCK_SIZE, ROOT_INODE};
use crate::volume::Volume;

use super::dir::DirectoryBrowser;
use super::extent::ExtentNavigator;
use super::reader::InodeReader;
use super::walk::{DirectoryWalk, WalkOptions};
use super::{Ext4, Options};

/// Shared handle to a filesystem. Every inode opened through it keeps a
/// clone, and each storage access takes the lock for exactly one read.
pub struct Synced<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Synced<T> {
    pub fn with_inner(inner: T) -> Synced<T> {
        Synced {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn inner<'a>(&'a self) -> MutexGuard<'a, T> {
        self.inner.lock()
    }
}

impl<T> Clone for Synced<T> {
    fn clone(&self) -> Self {
        Synced {
            inner: self.inner.clone(),
        }
    }
}

impl<S: SectorSize, V: Volume<u8, S>> Synced<Ext4<S, V>> {
    pub fn new(volume: V) -> Result<Synced<Ext4<S, V>>, Error> {
        Ext4::new(volume).map(Synced::with_inner)
    }

    pub fn with_options(
        volume: V,
        options: Options,
    ) -> Result<Synced<Ext4<S, V>>, Error> {
        Ext4::with_options(volume, options).map(Synced::with_inner)
    }

    pub fn root_inode(&self) -> Result<Inode<S, V>, Error> {
        self.inode_nth(ROOT_INODE)
    }

    /// Opens inode `num` (1-based).
    pub fn inode_nth(&self, num: u32) -> Result<Inode<S, V>, Error> {
        let (raw, addr) = {
            let fs = self.inner();
            fs.read_inode(num)?
        };
        debug!("opened inode {} ({} bytes)", num, raw.size());
        Ok(Inode::new(self.clone(), raw, addr, num))
    }

    /// Walks the whole tree below the root directory.
    pub fn walk(&self) -> Result<DirectoryWalk<S, V>, Error> {
        DirectoryWalk::new(self, ROOT_INODE)
    }

    pub fn walk_with(
        &self,
        options: WalkOptions,
    ) -> Result<DirectoryWalk<S, V>, Error> {
        DirectoryWalk::with_options(self, ROOT_INODE, options)
    }

    pub fn sector_size(&self) -> usize {
        S::SIZE
    }

    pub fn log_sector_size(&self) -> u32 {
        S::LOG_SIZE
    }
}

impl<S: SectorSize, V: Volume<u8, S>> Debug for Synced<Ext4<S, V>> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Synced<Ext4<{}>>", S::SIZE)
    }
}

/// An opened inode. Cheap to clone; clones share the filesystem handle.
pub struct Inode<S: SectorSize, V: Volume<u8, S>> {
    fs: Synced<Ext4<S, V>>,
    inner: RawInode,
    addr: Address<S>,
    num: u32,
}

impl<S: SectorSize, V: Volume<u8, S>> Clone for Inode<S, V> {
    fn clone(&self) -> Self {
        Inode {
            fs: self.fs.clone(),
            inner: self.inner,
            addr: self.addr,
            num: self.num,
        }
    }
}

impl<S: SectorSize, V: Volume<u8, S>> Debug for Inode<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Inode")
            .field("num", &self.num)
            .field("addr", &self.addr)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<S: SectorSize, V: Volume<u8, S>> Inode<S, V> {
    pub fn new(
        fs: Synced<Ext4<S, V>>,
        inner: RawInode,
        addr: Address<S>,
        num: u32,
    ) -> Inode<S, V> {
        Inode {
            fs,
            inner,
            addr,
            num,
        }
    }

    pub fn fs(&self) -> &Synced<Ext4<S, V>> {
        &self.fs
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    /// Where the raw inode sits on the volume.
    pub fn address(&self) -> Address<S> {
        self.addr
    }

    pub fn raw(&self) -> &RawInode {
        &self.inner
    }

    pub fn size(&self) -> u64 {
        self.inner.size()
    }

    pub fn is_dir(&self) -> bool {
        self.inner.is_dir()
    }

    pub fn uses_extents(&self) -> bool {
        self.inner.uses_extents()
    }

    pub fn in_use(&self) -> bool {
        self.inner.hard_links > 0
    }

    pub fn extent_root(&self) -> &[u8; INODE_BLOCK_SIZE] {
        &self.inner.block
    }

    pub fn navigator(&self) -> ExtentNavigator<S, V> {
        ExtentNavigator::new(self.clone())
    }

    pub fn reader(&self) -> InodeReader<S, V> {
        InodeReader::new(self.clone())
    }

    pub fn directory(&self) -> Result<DirectoryBrowser<S, V>, Error> {
        DirectoryBrowser::new(self.clone())
    }

    /// Appends the whole payload to `buf` and returns how many bytes that
    /// was.
    pub fn read_to_end(&self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        let block_size = {
            let fs = self.fs.inner();
            fs.block_size()
        };

        let mut reader = self.reader();
        let mut chunk = vec![0_u8; block_size];
        let mut total = 0;
        loop {
            let size = reader.read(&mut chunk)?;
            if size == 0 {
                return Ok(total);
            }
            buf.extend_from_slice(&chunk[..size]);
            total += size;
        }
    }
}
