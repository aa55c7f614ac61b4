//! 磁盘上的 inode 记录
//!
//! 文件的数据存放在至多四个区段里。逻辑偏移按槽位顺序在区段间定位，
//! 再换算为**块缓存层**使用的绝对块ID：
//! `数据区起始块 + 区段起始块 + 区段内偏移 / BLOCK_SIZE`。
//!
//! 目录的空间用于存放子项的元信息；
//! 文件的空间用于存放它的数据。

use enumflags2::{bitflags, BitFlags};

use super::{DirEntry, ExtentList};
use crate::block_cache::BlockCacheManager;
use crate::host::Credentials;
use crate::{BLOCK_SIZE, DataBlock, Error, Result};

/// 文件类型位的掩码
const S_IFMT: u32 = 0o170000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
    _pad: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileKind {
    Directory = 0o040000,
    Regular = 0o100000,
    Symlink = 0o120000,
}

/// 权限位
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perm {
    OtherExec = 0o1,
    OtherWrite = 0o2,
    OtherRead = 0o4,
    GroupExec = 0o10,
    GroupWrite = 0o20,
    GroupRead = 0o40,
    OwnerExec = 0o100,
    OwnerWrite = 0o200,
    OwnerRead = 0o400,
    Sticky = 0o1000,
    SetGid = 0o2000,
    SetUid = 0o4000,
}

/// 文件类型 + 权限位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub kind: FileKind,
    pub perm: BitFlags<Perm>,
}

#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct DiskInode {
    /// ID
    pub id: u32,
    /// 类型与权限，布局同 POSIX `st_mode`
    mode: u32,
    pub uid: u32,
    pub gid: u32,
    // 不用usize是为了严控布局
    pub size: u32,
    /// 占用的数据块数
    pub blocks: u32,
    /// 硬链接个数
    pub links: u32,
    /// 所在目录的 inode ID，根目录指向自己
    pub parent: u32,
    extents: ExtentList,
    _reserved: u32,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
    _reserved2: [u32; 2],
}

impl Timestamp {
    #[inline]
    pub const fn new(secs: u64, nanos: u32) -> Self {
        Self {
            secs,
            nanos,
            _pad: 0,
        }
    }
}

impl FileKind {
    pub fn from_mode(mode: u32) -> Result<Self> {
        match mode & S_IFMT {
            0o040000 => Ok(Self::Directory),
            0o100000 => Ok(Self::Regular),
            0o120000 => Ok(Self::Symlink),
            _ => Err(Error::UnsupportedType),
        }
    }
}

impl Mode {
    #[inline]
    pub fn new(kind: FileKind, perm: impl Into<BitFlags<Perm>>) -> Self {
        Self {
            kind,
            perm: perm.into(),
        }
    }

    /// 0o755 的目录
    pub fn dir() -> Self {
        Self::new(FileKind::Directory, BitFlags::<Perm>::from_bits_truncate(0o755))
    }

    /// 0o644 的普通文件
    pub fn file() -> Self {
        Self::new(FileKind::Regular, BitFlags::<Perm>::from_bits_truncate(0o644))
    }

    /// 0o777 的符号链接
    pub fn symlink() -> Self {
        Self::new(FileKind::Symlink, BitFlags::<Perm>::from_bits_truncate(0o777))
    }

    pub fn from_bits(bits: u32) -> Result<Self> {
        Ok(Self {
            kind: FileKind::from_mode(bits)?,
            perm: BitFlags::from_bits_truncate(bits & !S_IFMT),
        })
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.kind as u32 | self.perm.bits()
    }
}

impl DiskInode {
    /// 清零整条记录后按类型设定初值
    pub fn init(
        &mut self,
        id: u32,
        mode: Mode,
        owner: Credentials,
        parent: u32,
        now: Timestamp,
    ) {
        let links = match mode.kind {
            // `.` 与 `..`
            FileKind::Directory => 2,
            FileKind::Regular | FileKind::Symlink => 1,
        };

        *self = Self {
            id,
            mode: mode.bits(),
            uid: owner.uid,
            gid: owner.gid,
            links,
            parent,
            atime: now,
            mtime: now,
            ctime: now,
            ..Default::default()
        }
    }

    #[inline]
    pub fn mode(&self) -> Result<Mode> {
        Mode::from_bits(self.mode).map_err(|_| Error::Fault)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == FileKind::Directory as u32
    }

    #[inline]
    pub fn extents(&self) -> &ExtentList {
        &self.extents
    }

    #[inline]
    pub fn extents_mut(&mut self) -> &mut ExtentList {
        &mut self.extents
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，不越过文件末尾
    pub fn read_at(
        &self,
        offset: usize,
        buf: &mut [u8],
        cache: &BlockCacheManager,
        data_area: u32,
    ) -> usize {
        let size = self.size as usize;
        if self.extents.is_empty() || offset >= size {
            return 0;
        }

        let mut start = offset;
        let end = offset.saturating_add(buf.len()).min(size);

        // 已读取多少字节
        let mut read_size = 0;
        while start < end {
            let Some((block_id, block_inoffset)) = self.block_pos(start, data_area) else {
                break;
            };
            // 当前块内可读的字节数，块不会跨区段
            let block_read_size = (BLOCK_SIZE - block_inoffset).min(end - start);
            let dest = &mut buf[read_size..read_size + block_read_size];

            cache
                .get(block_id as usize)
                .lock()
                .map(0, |data_block: &DataBlock| {
                    let src = &data_block[block_inoffset..block_inoffset + block_read_size];
                    dest.copy_from_slice(src);
                });

            read_size += block_read_size;
            start += block_read_size;
        }

        read_size
    }

    /// 在现有区段内从指定位置写入`buf`，返回写入的字节数。
    /// 区段用尽即停，必要时抬高文件大小。
    pub fn write_at(
        &mut self,
        offset: usize,
        buf: &[u8],
        cache: &BlockCacheManager,
        data_area: u32,
    ) -> usize {
        let mut start = offset;
        let Some(end) = offset.checked_add(buf.len()) else {
            return 0;
        };

        let mut written_size = 0;
        while start < end {
            let Some((block_id, block_inoffset)) = self.block_pos(start, data_area) else {
                break;
            };
            let block_write_size = (BLOCK_SIZE - block_inoffset).min(end - start);

            cache
                .get(block_id as usize)
                .lock()
                .map_mut(0, |data_block: &mut DataBlock| {
                    let src = &buf[written_size..written_size + block_write_size];
                    let dest =
                        &mut data_block[block_inoffset..block_inoffset + block_write_size];
                    dest.copy_from_slice(src);
                });

            written_size += block_write_size;
            start += block_write_size;
        }

        if written_size > 0 && start > self.size as usize {
            self.size = start as u32;
        }

        written_size
    }

    /// 现有区段能容纳的目录项个数
    #[inline]
    pub fn entry_capacity(&self) -> usize {
        self.extents.capacity() / DirEntry::SIZE
    }

    /// 读取第 `slot` 个目录项
    pub fn dir_entry(
        &self,
        slot: usize,
        cache: &BlockCacheManager,
        data_area: u32,
    ) -> Option<DirEntry> {
        let (block_id, block_inoffset) = self.block_pos(slot * DirEntry::SIZE, data_area)?;
        Some(
            cache
                .get(block_id as usize)
                .lock()
                .map(block_inoffset, |dir_entry: &DirEntry| dir_entry.clone()),
        )
    }

    /// 覆写第 `slot` 个目录项，槽位必须在现有区段内
    pub fn set_dir_entry(
        &self,
        slot: usize,
        dir_entry: DirEntry,
        cache: &BlockCacheManager,
        data_area: u32,
    ) -> Result<()> {
        let (block_id, block_inoffset) = self
            .block_pos(slot * DirEntry::SIZE, data_area)
            .ok_or(Error::Fault)?;
        cache
            .get(block_id as usize)
            .lock()
            .map_mut(block_inoffset, |disk_entry: &mut DirEntry| *disk_entry = dir_entry);
        Ok(())
    }

    /// 逻辑偏移 => (绝对块ID, 块内偏移)
    fn block_pos(&self, offset: usize, data_area: u32) -> Option<(u32, usize)> {
        let (extent, inoffset) = self.extents.locate(offset)?;
        let block_id = data_area + extent.start_block + (inoffset / BLOCK_SIZE) as u32;
        Some((block_id, inoffset % BLOCK_SIZE))
    }
}
