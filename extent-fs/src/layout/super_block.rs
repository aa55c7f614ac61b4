use crate::{BLOCK_BITS, MAGIC};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域；
/// - 记录空闲计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    /// inode 槽位总数，含保留的 0 号
    pub inode_count: u32,
    /// 数据块总数，即数据位图的有效位数
    pub data_blocks: u32,
    pub free_inodes: u32,
    pub free_blocks: u32,
    pub inode_bitmap_blocks: u32,
    pub inode_area_blocks: u32,
    pub data_bitmap_blocks: u32,
    pub data_area_blocks: u32,
}

impl SuperBlock {
    #[inline]
    pub fn init(
        &mut self,
        total_blocks: u32,
        inode_count: u32,
        data_blocks: u32,
        inode_bitmap_blocks: u32,
        inode_area_blocks: u32,
        data_bitmap_blocks: u32,
        data_area_blocks: u32,
    ) {
        *self = Self {
            magic: MAGIC,
            total_blocks,
            inode_count,
            data_blocks,
            // 0 号 inode 保留
            free_inodes: inode_count - 1,
            free_blocks: data_blocks,
            inode_bitmap_blocks,
            inode_area_blocks,
            data_bitmap_blocks,
            data_area_blocks,
        };
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// 各区域恰好铺满整个卷，位图与 inode 区域容得下它们声明的数量
    pub fn fits(&self, inodes_per_block: usize) -> bool {
        let areas = [
            self.inode_bitmap_blocks,
            self.inode_area_blocks,
            self.data_bitmap_blocks,
            self.data_area_blocks,
        ];
        let used = areas.iter().map(|&blocks| blocks as u64).sum::<u64>() + 1;
        let bits = |blocks: u32| blocks as u64 * BLOCK_BITS as u64;

        used == self.total_blocks as u64
            && self.inode_count as u64 <= bits(self.inode_bitmap_blocks)
            && self.inode_count as u64 <= self.inode_area_blocks as u64 * inodes_per_block as u64
            && self.data_blocks == self.data_area_blocks
            && self.data_blocks as u64 <= bits(self.data_bitmap_blocks)
            && self.free_inodes < self.inode_count
            && self.free_blocks <= self.data_blocks
    }
}
