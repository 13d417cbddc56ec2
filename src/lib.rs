//! Read-only access to ext4 volumes: on-disk structure decoding, extent tree
//! navigation, sequential inode reads and breadth-first directory walks.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod error;
pub mod fs;
pub mod sector;
pub mod sys;
pub mod volume;

pub use crate::error::Error;
pub use crate::fs::dir::{DirectoryBrowser, DirectoryEntry};
pub use crate::fs::extent::{ExtentNavigator, Mapping};
pub use crate::fs::reader::InodeReader;
pub use crate::fs::sync::{Inode, Synced};
pub use crate::fs::walk::{DirectoryWalk, WalkOptions};
pub use crate::fs::{Ext4, HolePolicy, Options};
