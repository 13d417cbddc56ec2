//! Raw on-disk structures, decoded from little-endian byte records.

pub mod block_group;
pub mod dir_entry;
pub mod extent;
pub mod inode;
pub mod superblock;
