//! # 索引节点层
//!
//! 位于内存的虚拟文件系统，确立了文件系统的操作逻辑：
//! 通过多个 [`Inode`] 形成文件树。
//!
//! 每个公开操作都先锁住整个卷，再映射磁盘上的 inode 记录。

mod dir;
mod file;

pub use dir::ReadDir;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::ExtentFileSystem;
use crate::Result;
use crate::block_cache::BlockCacheManager;
use crate::layout::{DiskInode, Extent, FileKind, Mode, Timestamp};

pub struct Inode {
    /// inode所在块
    block_id: usize,
    /// inode的块内偏移
    block_offset: usize,
    fs: Arc<Mutex<ExtentFileSystem>>,
    cache: Arc<BlockCacheManager>,
}

/// 交给外部目录树的 inode 快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub inode: u32,
    pub mode: Mode,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// 占用的数据块数
    pub blocks: u32,
    pub links: u32,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
    /// 按槽位顺序排列的区段
    pub extents: Vec<Extent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    /// Inode number
    pub inode: u32,
    pub ty: DirEntryType,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DirEntryType {
    #[default]
    Unknown,
    Directory,
    Regular,
    SymLink,
}

impl Inode {
    #[inline]
    pub(crate) fn new(
        block_id: u32,
        block_offset: usize,
        fs: Arc<Mutex<ExtentFileSystem>>,
        cache: Arc<BlockCacheManager>,
    ) -> Self {
        Self {
            block_id: block_id as usize,
            block_offset,
            fs,
            cache,
        }
    }

    /// inode ID 在创建后不再改变，无需锁住卷
    #[inline]
    pub fn id(&self) -> u32 {
        self.on_disk(|disk_inode| disk_inode.id)
    }

    pub fn stat(&self) -> Result<Stat> {
        let _fs = self.fs.lock();
        self.on_disk(Stat::from_disk)
    }

    pub fn kind(&self) -> Result<FileKind> {
        let _fs = self.fs.lock();
        self.on_disk(|disk_inode| disk_inode.mode().map(|mode| mode.kind))
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        let _fs = self.fs.lock();
        self.on_disk(|disk_inode| disk_inode.is_dir())
    }
}

impl Inode {
    /// 读取对磁盘的映射并处理
    fn on_disk<V>(&self, f: impl FnOnce(&DiskInode) -> V) -> V {
        self.cache
            .get(self.block_id)
            .lock()
            .map(self.block_offset, f)
    }

    /// 以某种方式修改对磁盘的映射
    fn on_disk_mut<V>(&self, f: impl FnOnce(&mut DiskInode) -> V) -> V {
        self.cache
            .get(self.block_id)
            .lock()
            .map_mut(self.block_offset, f)
    }

    /// 凭借ID获取Inode
    #[inline]
    fn inode(&self, fs: &ExtentFileSystem, id: u32) -> Result<Inode> {
        let (block_id, block_offset) = fs.live_record(id)?;
        Ok(Self::new(
            block_id,
            block_offset,
            self.fs.clone(),
            self.cache.clone(),
        ))
    }
}

impl Stat {
    fn from_disk(disk_inode: &DiskInode) -> Result<Self> {
        Ok(Self {
            inode: disk_inode.id,
            mode: disk_inode.mode()?,
            uid: disk_inode.uid,
            gid: disk_inode.gid,
            size: disk_inode.size as u64,
            blocks: disk_inode.blocks,
            links: disk_inode.links,
            atime: disk_inode.atime,
            mtime: disk_inode.mtime,
            ctime: disk_inode.ctime,
            extents: disk_inode.extents().iter().copied().collect(),
        })
    }
}

impl From<FileKind> for DirEntryType {
    #[inline]
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Directory => Self::Directory,
            FileKind::Regular => Self::Regular,
            FileKind::Symlink => Self::SymLink,
        }
    }
}
