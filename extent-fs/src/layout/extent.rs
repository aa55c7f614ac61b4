//! 区段：一段连续的数据块
//!
//! 一个 inode 至多持有 [`MAX_EXTENTS`] 个区段，按槽位顺序首尾相接，
//! 构成文件的逻辑地址空间。

use crate::{BLOCK_SIZE, Error, MAX_EXTENTS, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Extent {
    /// 数据区内的起始块号
    pub start_block: u32,
    /// 块数，为 0 表示空槽位
    pub block_count: u32,
}

/// 定长的区段表，只能追加
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct ExtentList {
    count: u32,
    slots: [Extent; MAX_EXTENTS],
}

impl Extent {
    #[inline]
    pub fn new(start_block: u32, block_count: u32) -> Self {
        Self {
            start_block,
            block_count,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    /// 区段覆盖的字节数
    #[inline]
    pub fn bytes(&self) -> usize {
        self.block_count as usize * BLOCK_SIZE
    }

    #[inline]
    pub fn end_block(&self) -> u32 {
        self.start_block + self.block_count
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start_block < other.end_block()
            && other.start_block < self.end_block()
    }
}

impl ExtentList {
    /// 已占用的槽位数
    #[inline]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 把区段写进第一个空槽位
    pub fn push(&mut self, extent: Extent) -> Result<()> {
        debug_assert!(!extent.is_empty());
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_empty())
            .ok_or(Error::ExtentSlotsExhausted)?;
        *slot = extent;
        self.count += 1;
        Ok(())
    }

    /// 按槽位顺序遍历已占用的区段
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.slots.iter().filter(|extent| !extent.is_empty())
    }

    /// 全部区段的块数之和
    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.iter().map(|extent| extent.block_count).sum()
    }

    /// 全部区段的字节容量
    #[inline]
    pub fn capacity(&self) -> usize {
        self.total_blocks() as usize * BLOCK_SIZE
    }

    /// 逻辑偏移定位：返回所在区段与区段内偏移。
    /// 越过全部区段的偏移返回空。
    pub fn locate(&self, offset: usize) -> Option<(Extent, usize)> {
        let mut base = 0;
        for extent in self.iter() {
            if offset < base + extent.bytes() {
                return Some((*extent, offset - base));
            }
            base += extent.bytes();
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifth_extent_is_rejected() {
        let mut list = ExtentList::default();
        for i in 0..MAX_EXTENTS as u32 {
            list.push(Extent::new(i * 4, 2)).unwrap();
        }
        assert_eq!(list.len(), MAX_EXTENTS);
        assert_eq!(
            list.push(Extent::new(100, 1)),
            Err(Error::ExtentSlotsExhausted)
        );
        assert_eq!(list.len(), MAX_EXTENTS);
        assert_eq!(list.total_blocks(), 8);
    }

    #[test]
    fn locate_walks_extents_in_slot_order() {
        let mut list = ExtentList::default();
        list.push(Extent::new(7, 1)).unwrap();
        list.push(Extent::new(2, 2)).unwrap();

        assert_eq!(list.locate(0), Some((Extent::new(7, 1), 0)));
        assert_eq!(
            list.locate(BLOCK_SIZE + 10),
            Some((Extent::new(2, 2), 10))
        );
        assert_eq!(
            list.locate(3 * BLOCK_SIZE - 1),
            Some((Extent::new(2, 2), 2 * BLOCK_SIZE - 1))
        );
        assert_eq!(list.locate(3 * BLOCK_SIZE), None);
    }

    #[test]
    fn overlap_is_half_open() {
        let a = Extent::new(4, 4);
        assert!(a.overlaps(&Extent::new(7, 1)));
        assert!(!a.overlaps(&Extent::new(8, 3)));
        assert!(!a.overlaps(&Extent::new(0, 4)));
        assert!(!a.overlaps(&Extent::default()));
    }
}
