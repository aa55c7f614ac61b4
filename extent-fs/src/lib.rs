#![no_std]

extern crate alloc;

/* extent-fs 的整体架构，自上而下 */

// 索引节点层：实现目录查找、遍历、文件创建与读写
mod vfs;

// 磁盘块管理器层：位图分配器与索引节点表
mod efs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;

// 与外部目录树协作者的接口
mod host;

mod error;

pub use self::{
    efs::{ExtentFileSystem, FsStat},
    error::{Error, Result},
    host::{Credentials, Host, NullHost},
    layout::{DirEntry, Extent, FileKind, Mode, Perm, Timestamp},
    vfs::{DirEntryType, Dirent, Inode, ReadDir, Stat},
};

pub use block_dev::BlockDevice;

pub const MAGIC: u32 = 0x4558_5446;
pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// 每个 inode 最多持有的区段数
pub const MAX_EXTENTS: usize = 4;
/// 文件名的最大字节数
pub const NAME_MAX_LEN: usize = 27;
/// 根目录的 inode 编号，0 号保留不用
pub const ROOT_INODE: u32 = 1;

type DataBlock = [u8; BLOCK_SIZE];
