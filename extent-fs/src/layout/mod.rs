//! # 磁盘数据结构层
//!
//! extent-fs 的磁盘布局：
//! 超级块 | 索引节点位图 | 索引节点区域 | 数据块位图 | 数据块区域

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod extent;
pub use extent::{Extent, ExtentList};

mod inode;
pub use inode::{DiskInode, FileKind, Mode, Perm, Timestamp};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;

#[cfg(test)]
mod tests {
    use core::mem;

    use super::*;
    use crate::BLOCK_SIZE;

    #[test]
    fn volume() {
        assert!(mem::size_of::<SuperBlock>() <= BLOCK_SIZE);
        assert_eq!(128, mem::size_of::<DiskInode>());
        assert_eq!(32, mem::size_of::<DirEntry>());
        assert_eq!(BLOCK_SIZE / DirEntry::SIZE, 128);
    }
}
