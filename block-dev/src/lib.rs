//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! [`RamDisk`] 是常驻内存的块设备，整个卷都在内存里。

#![no_std]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

use spin::Mutex;

/// 块设备驱动特质
///
/// `buf` 的长度即块大小，由文件系统决定。
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    fn write_block(&self, block_id: usize, buf: &[u8]);
}

impl fmt::Debug for dyn BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlockDevice")
    }
}

/// 内存盘
pub struct RamDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * blocks]),
        }
    }

    #[inline]
    pub fn blocks(&self) -> usize {
        self.data.lock().len() / self.block_size
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let data = self.data.lock();
        let start = block_id * self.block_size;
        assert!(start + buf.len() <= data.len(), "block {block_id} out of range");
        buf.copy_from_slice(&data[start..start + buf.len()]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut data = self.data.lock();
        let start = block_id * self.block_size;
        assert!(start + buf.len() <= data.len(), "block {block_id} out of range");
        data[start..start + buf.len()].copy_from_slice(buf);
    }
}
