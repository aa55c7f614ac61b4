//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟缓冲区，
//! 把即将操作的块复制到内存中，提高对块设备的操作效率。
//! 同时，块缓存层也会尝试返回已缓存的块。
//!
//! 每个卷持有自己的缓存管理器，不同卷的同号块互不干扰。
//! 缓存与块设备同步后并不会移除块缓存，该操作由缓存管理器调度执行。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::mem;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::BLOCK_SIZE;

/// 块缓存管理，缓存、调度块缓存
#[derive(Debug)]
pub struct BlockCacheManager {
    /// 底层块设备的引用
    block_device: Arc<dyn BlockDevice>,
    queue: Mutex<Vec<(usize, Arc<Mutex<BlockCache>>)>>,
}

/// 块数据按 8 字节对齐，磁盘结构可以直接映射其上
#[repr(C, align(8))]
struct CacheData([u8; BLOCK_SIZE]);

/// 内存中的块缓存
pub struct BlockCache {
    /// 缓存的数据
    data: CacheData,
    /// 对应的块ID
    block_id: usize,
    /// 底层块设备的引用
    block_device: Arc<dyn BlockDevice>,
    /// 是否为脏块
    modified: bool,
}

impl BlockCache {
    pub fn new(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Self {
        let mut data = CacheData([0; BLOCK_SIZE]);
        block_device.read_block(block_id, &mut data.0);

        Self {
            data,
            block_id,
            block_device,
            modified: false,
        }
    }

    pub fn sync(&mut self) {
        if self.modified {
            self.modified = false;
            self.block_device.write_block(self.block_id, &self.data.0);
        }
    }

    pub fn get<T: Sized>(&self, offset: usize) -> &T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= BLOCK_SIZE);
        let addr = self.offset(offset).cast();
        unsafe { &*addr }
    }

    pub fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= BLOCK_SIZE);
        self.modified = true;
        let addr = self.offset_mut(offset).cast();
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Sized, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

impl BlockCache {
    #[inline]
    fn offset(&self, count: usize) -> *const u8 {
        &self.data.0[count]
    }

    #[inline]
    fn offset_mut(&mut self, count: usize) -> *mut u8 {
        &mut self.data.0[count]
    }
}

impl fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCache")
            .field("block_id", &self.block_id)
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.sync();
    }
}

impl BlockCacheManager {
    /// 块缓存个数的上限
    const CAPACITY: usize = 16;

    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            block_device,
            queue: Mutex::new(Vec::with_capacity(Self::CAPACITY)),
        }
    }

    // 块缓存调度策略：踢走闲置块
    pub fn get(&self, block_id: usize) -> Arc<Mutex<BlockCache>> {
        let mut queue = self.queue.lock();

        // 尝试从缓冲区中读取块
        if let Some(cache) = queue
            .iter()
            .find_map(|(id, cache)| (block_id == *id).then_some(cache))
        {
            return Arc::clone(cache);
        };

        // 触及上限，写回一个块
        if queue.len() == Self::CAPACITY {
            let index = queue
                .iter()
                .position(|(_, cache)| Arc::strong_count(cache) == 1) // 没有其它引用的才能写回
                .expect("run out of block cache");
            queue.remove(index);
        }

        // 缓存新块
        let block_cache = Arc::new(Mutex::new(BlockCache::new(
            block_id,
            self.block_device.clone(),
        )));
        queue.push((block_id, block_cache.clone()));

        block_cache
    }

    pub fn sync_all(&self) {
        self.queue
            .lock()
            .iter()
            .for_each(|(_, cache)| cache.lock().sync());
    }
}
