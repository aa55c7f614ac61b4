//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：位图分配器、区段查找与 inode 表。
//!
//! 整个卷由一把锁保护，分配器的“扫描再标记”在同一次独占借用内完成，
//! 空闲计数与位图同步更新。

use core::mem;

use alloc::sync::Arc;
use block_dev::BlockDevice;
use log::{debug, error, info, warn};
use spin::Mutex;

use crate::block_cache::BlockCacheManager;
use crate::host::Host;
use crate::layout::*;
use crate::vfs::Inode;
use crate::{BLOCK_BITS, BLOCK_SIZE, DataBlock, Error, ROOT_INODE, Result};

const INODE_SIZE: usize = mem::size_of::<DiskInode>();
const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

#[derive(Debug)]
pub struct ExtentFileSystem {
    cache: Arc<BlockCacheManager>,
    host: Arc<dyn Host>,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    inode_area_start_block: u32,
    data_area_start_block: u32,
    total_blocks: u32,
    inode_count: u32,
    free_inodes: u32,
    free_blocks: u32,
}

/// 卷的用量统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStat {
    pub block_size: usize,
    pub total_blocks: u32,
    pub data_blocks: u32,
    pub free_blocks: u32,
    pub inode_count: u32,
    pub free_inodes: u32,
}

/// 新 inode 从父目录继承的信息
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParentHint {
    pub id: u32,
    pub mode: Mode,
    pub gid: u32,
}

impl ExtentFileSystem {
    /// 格式化整个块设备，建立根目录
    pub fn new(
        block_device: Arc<dyn BlockDevice>,
        total_blocks: u32,
        inode_count: u32,
        host: Arc<dyn Host>,
    ) -> Result<Arc<Mutex<Self>>> {
        // 0 号保留，至少还要容下根目录
        if inode_count <= ROOT_INODE {
            return Err(Error::BadGeometry);
        }

        let inode_bitmap_blocks = (inode_count as usize).div_ceil(BLOCK_BITS) as u32;
        let inode_area_blocks = (inode_count as usize * INODE_SIZE).div_ceil(BLOCK_SIZE) as u32;
        let inode_total_blocks = inode_bitmap_blocks + inode_area_blocks;

        let data_total_blocks = total_blocks
            .checked_sub(1 + inode_total_blocks)
            .ok_or(Error::BadGeometry)?;
        let data_bitmap_blocks = (data_total_blocks + BLOCK_BITS as u32) / (BLOCK_BITS as u32 + 1);
        let data_area_blocks = data_total_blocks - data_bitmap_blocks;
        if data_area_blocks == 0 {
            return Err(Error::BadGeometry);
        }

        let zero: DataBlock = [0; BLOCK_SIZE];
        for i in 0..total_blocks {
            block_device.write_block(i as usize, &zero);
        }

        let cache = Arc::new(BlockCacheManager::new(block_device));
        cache.get(0).lock().map_mut(0, |super_block: &mut SuperBlock| {
            super_block.init(
                total_blocks,
                inode_count,
                data_area_blocks,
                inode_bitmap_blocks,
                inode_area_blocks,
                data_bitmap_blocks,
                data_area_blocks,
            )
        });

        let mut efs = Self {
            cache: cache.clone(),
            host,
            inode_bitmap: Bitmap::new(1, inode_bitmap_blocks as usize, inode_count as usize),
            data_bitmap: Bitmap::new(
                (1 + inode_total_blocks) as usize,
                data_bitmap_blocks as usize,
                data_area_blocks as usize,
            ),
            inode_area_start_block: 1 + inode_bitmap_blocks,
            data_area_start_block: 1 + inode_total_blocks + data_bitmap_blocks,
            total_blocks,
            inode_count,
            free_inodes: inode_count - 1,
            free_blocks: data_area_blocks,
        };

        // 0 号 inode 永不分配
        efs.inode_bitmap.set_range(&cache, 0, 1);

        let root = efs.create(None, Mode::dir().bits())?;
        assert_eq!(root, ROOT_INODE);
        efs.sync();

        info!(
            "formatted {total_blocks} blocks: {inode_count} inodes, {data_area_blocks} data blocks"
        );
        Ok(Arc::new(Mutex::new(efs)))
    }

    pub fn open(block_device: Arc<dyn BlockDevice>, host: Arc<dyn Host>) -> Result<Arc<Mutex<Self>>> {
        let cache = Arc::new(BlockCacheManager::new(block_device));
        let super_block = cache
            .get(0)
            .lock()
            .map(0, |super_block: &SuperBlock| *super_block);
        if !super_block.is_valid() {
            error!("bad magic, not an extent-fs volume");
            return Err(Error::InvalidSuperBlock);
        }
        if super_block.inode_count <= ROOT_INODE {
            error!("superblock declares no room for the root inode");
            return Err(Error::InvalidSuperBlock);
        }
        if !super_block.fits(INODES_PER_BLOCK) {
            error!("superblock geometry is inconsistent: {super_block:?}");
            return Err(Error::InvalidSuperBlock);
        }

        let inode_total_blocks = super_block.inode_bitmap_blocks + super_block.inode_area_blocks;
        let efs = Self {
            cache: cache.clone(),
            host,
            inode_bitmap: Bitmap::new(
                1,
                super_block.inode_bitmap_blocks as usize,
                super_block.inode_count as usize,
            ),
            data_bitmap: Bitmap::new(
                1 + inode_total_blocks as usize,
                super_block.data_bitmap_blocks as usize,
                super_block.data_blocks as usize,
            ),
            inode_area_start_block: 1 + super_block.inode_bitmap_blocks,
            data_area_start_block: 1 + inode_total_blocks + super_block.data_bitmap_blocks,
            total_blocks: super_block.total_blocks,
            inode_count: super_block.inode_count,
            free_inodes: super_block.free_inodes,
            free_blocks: super_block.free_blocks,
        };

        // 空闲计数必须与位图一致
        let free_inodes = efs.inode_bitmap.count_free(&cache);
        let free_blocks = efs.data_bitmap.count_free(&cache);
        if free_inodes != efs.free_inodes || free_blocks != efs.free_blocks {
            error!(
                "free counters disagree with bitmaps: inodes {}/{free_inodes}, blocks {}/{free_blocks}",
                efs.free_inodes, efs.free_blocks
            );
            return Err(Error::Fault);
        }

        Ok(Arc::new(Mutex::new(efs)))
    }

    /// 在 inode 位图中分配新的 inode 并返回其ID
    pub(crate) fn allocate_inode(&mut self) -> Result<u32> {
        if self.free_inodes == 0 {
            warn!("no free inode available");
            return Err(Error::NoSpace);
        }

        let Some(inode_id) = self.inode_bitmap.alloc(&self.cache, ROOT_INODE) else {
            warn!("no free inode available");
            return Err(Error::NoSpace);
        };
        self.free_inodes -= 1;
        Ok(inode_id)
    }

    pub(crate) fn release_inode(&mut self, inode_id: u32) {
        self.inode_bitmap.dealloc(&self.cache, inode_id);
        self.free_inodes += 1;
    }

    /// 首次适配地寻找 `required_blocks` 个连续空闲块，记入 `disk_inode` 的第一个空槽位
    pub(crate) fn find_and_reserve_extent(
        &mut self,
        required_blocks: u32,
        disk_inode: &mut DiskInode,
    ) -> Result<Extent> {
        if self.free_blocks < required_blocks {
            warn!("no free data block available");
            return Err(Error::NoSpace);
        }

        let Some(start_block) = self.data_bitmap.find_run(&self.cache, required_blocks) else {
            warn!("no contiguous range of {required_blocks} blocks available");
            return Err(Error::NoContiguousSpace);
        };

        let inode_id = disk_inode.id;
        let extent = Extent::new(start_block, required_blocks);
        debug_assert!(disk_inode.extents().iter().all(|other| !other.overlaps(&extent)));
        disk_inode
            .extents_mut()
            .push(extent)
            .inspect_err(|_| warn!("inode {inode_id} has no free extent slot"))?;

        // 标记这些块为已使用
        self.data_bitmap
            .set_range(&self.cache, start_block, required_blocks);
        self.free_blocks -= required_blocks;
        disk_inode.blocks += required_blocks;

        debug!(
            "inode {inode_id}: extent #{} = {start_block}+{required_blocks}",
            disk_inode.extents().len()
        );
        Ok(extent)
    }

    /// 归还数据块，并把它清零
    pub(crate) fn release_block(&mut self, block: u32) {
        self.cache
            .get((self.data_area_start_block + block) as usize)
            .lock()
            .map_mut(0, |data_block: &mut DataBlock| data_block.fill(0));
        self.data_bitmap.dealloc(&self.cache, block);
        self.free_blocks += 1;
    }

    /// 通过ID获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**。
    /// 0 号与越界的ID无效。
    pub fn record_for(&self, inode_id: u32) -> Option<(u32, usize)> {
        if inode_id == 0 || inode_id >= self.inode_count {
            return None;
        }

        let block_id = self.inode_area_start_block + inode_id / INODES_PER_BLOCK as u32;
        let block_inoffset = inode_id as usize % INODES_PER_BLOCK * INODE_SIZE;

        Some((block_id, block_inoffset))
    }

    /// 已分配 inode 的位置；找不到记录或位图未登记都属于不一致
    pub(crate) fn live_record(&self, inode_id: u32) -> Result<(u32, usize)> {
        let pos = self.record_for(inode_id).ok_or(Error::Fault)?;
        if !self.inode_bitmap.test(&self.cache, inode_id) {
            error!("inode {inode_id} is referenced but not allocated");
            return Err(Error::Fault);
        }
        Ok(pos)
    }

    /// 建立指向已分配 inode 的句柄
    pub fn materialize(efs: &Arc<Mutex<Self>>, inode_id: u32) -> Result<Inode> {
        let fs = efs.lock();
        let (block_id, block_offset) = fs.live_record(inode_id)?;
        Ok(Inode::new(block_id, block_offset, efs.clone(), fs.cache.clone()))
    }

    pub fn root_inode(efs: &Arc<Mutex<Self>>) -> Inode {
        let fs = efs.lock();
        // 打开与格式化时都已确认根目录的槽位存在
        let (block_id, block_offset) = fs
            .record_for(ROOT_INODE)
            .expect("volume without root inode");
        Inode::new(block_id, block_offset, efs.clone(), fs.cache.clone())
    }

    /// 创建新 inode：校验类型、分配编号、初始化记录并预留一块区段。
    /// 编号分配之后的任何失败都会归还编号。
    pub(crate) fn create(&mut self, parent: Option<ParentHint>, mode: u32) -> Result<u32> {
        let mut mode = Mode::from_bits(mode)
            .inspect_err(|_| warn!("file type {mode:#o} not supported"))?;

        if self.free_inodes == 0 || self.free_blocks == 0 {
            warn!("no space for a new inode");
            return Err(Error::NoSpace);
        }

        let inode_id = self.allocate_inode()?;
        let Some((block_id, block_offset)) = self.record_for(inode_id) else {
            self.release_inode(inode_id);
            return Err(Error::Fault);
        };

        let mut owner = self.host.credentials();
        let now = self.host.now();
        let parent_id = match parent {
            Some(hint) => {
                // 父目录带 setgid：继承属组，子目录继续传递 setgid
                if hint.mode.perm.contains(Perm::SetGid) {
                    owner.gid = hint.gid;
                    if mode.kind == FileKind::Directory {
                        mode.perm |= Perm::SetGid;
                    }
                }
                hint.id
            }
            None => inode_id,
        };

        let cache = self.cache.clone();
        let reserved = cache
            .get(block_id as usize)
            .lock()
            .map_mut(block_offset, |disk_inode: &mut DiskInode| {
                disk_inode.init(inode_id, mode, owner, parent_id, now);
                let reserved = self.find_and_reserve_extent(1, disk_inode);
                if reserved.is_err() {
                    *disk_inode = DiskInode::default();
                }
                reserved
            });

        if let Err(err) = reserved {
            self.release_inode(inode_id);
            return Err(err);
        }

        Ok(inode_id)
    }

    /// 撤销一次已成功的 [`Self::create`]：归还区段与编号
    pub(crate) fn discard(&mut self, inode_id: u32) -> Result<()> {
        let (block_id, block_offset) = self.live_record(inode_id)?;
        let cache = self.cache.clone();
        let disk_inode = cache
            .get(block_id as usize)
            .lock()
            .map_mut(block_offset, |disk_inode: &mut DiskInode| {
                mem::take(disk_inode)
            });

        for extent in disk_inode.extents().iter() {
            for block in extent.start_block..extent.end_block() {
                self.release_block(block);
            }
        }
        self.release_inode(inode_id);
        Ok(())
    }

    /// 空闲计数写回超级块，所有脏块写回设备
    pub fn sync(&mut self) {
        let (free_inodes, free_blocks) = (self.free_inodes, self.free_blocks);
        self.cache
            .get(0)
            .lock()
            .map_mut(0, |super_block: &mut SuperBlock| {
                super_block.free_inodes = free_inodes;
                super_block.free_blocks = free_blocks;
            });
        self.cache.sync_all();
    }

    pub fn statfs(&self) -> FsStat {
        FsStat {
            block_size: BLOCK_SIZE,
            total_blocks: self.total_blocks,
            data_blocks: self.data_bitmap.len() as u32,
            free_blocks: self.free_blocks,
            inode_count: self.inode_count,
            free_inodes: self.free_inodes,
        }
    }

    #[inline]
    pub(crate) fn data_area(&self) -> u32 {
        self.data_area_start_block
    }

    #[inline]
    pub(crate) fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// 数据块 `block` 是否已分配
    #[inline]
    pub fn is_block_allocated(&self, block: u32) -> bool {
        self.data_bitmap.test(&self.cache, block)
    }
}
