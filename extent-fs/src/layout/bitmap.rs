use crate::BLOCK_BITS;
use crate::block_cache::BlockCacheManager;

/// 位图区域内块的结构
type BitmapBlock = [u64; BLOCK_BITS / 64];

/// 位图区域，记录其指示区域的分配情况
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: usize,
    /// 位图占用块数
    blocks: usize,
    /// 有效位数，超出部分永不分配
    len: usize,
}

/// 块编号
struct BlockID(u32);

impl Bitmap {
    #[inline]
    pub fn new(start_block_id: usize, blocks: usize, len: usize) -> Self {
        debug_assert!(len <= blocks * BLOCK_BITS);
        Self {
            start_block_id,
            blocks,
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 从第 `from` 位起分配第一个空闲位，返回其编号。
    /// 若位图的空间用尽，则返回空。
    pub fn alloc(&self, cache: &BlockCacheManager, from: u32) -> Option<u32> {
        let from = from as usize;

        // 起始块ID + 块索引 = 索引指向块的实际ID
        for block_index in from / BLOCK_BITS..self.blocks {
            let block_cache = cache.get(self.start_block_id + block_index);
            let mut block_cache = block_cache.lock();

            let Some((group_index, ingroup_index)) =
                block_cache.map(0, |bitmap_block: &BitmapBlock| {
                    bitmap_block
                        .iter()
                        .enumerate()
                        .find_map(|(group_index, &bits)| {
                            let base = block_index * BLOCK_BITS + group_index * 64;
                            let free = !bits & self.valid_mask(base, from);
                            (free != 0).then_some((group_index, free.trailing_zeros() as usize))
                        })
                })
            else {
                continue;
            };

            // 追加新位
            block_cache.map_mut(0, |bitmap_block: &mut BitmapBlock| {
                bitmap_block[group_index] |= 1 << ingroup_index;
            });
            return Some(BlockID::encode(block_index, group_index, ingroup_index));
        }

        None
    }

    /// 首次适配：自左向右寻找第一段长度为 `required` 的连续空闲位，返回其起始编号。
    /// 只查找，不标记。
    pub fn find_run(&self, cache: &BlockCacheManager, required: u32) -> Option<u32> {
        let required = required as usize;
        if required == 0 || required > self.len {
            return None;
        }

        let mut run_start = 0;
        let mut run = 0;
        for block_index in 0..self.blocks {
            let found = cache
                .get(self.start_block_id + block_index)
                .lock()
                .map(0, |bitmap_block: &BitmapBlock| {
                    for (group_index, &bits) in bitmap_block.iter().enumerate() {
                        let base = block_index * BLOCK_BITS + group_index * 64;
                        if base >= self.len {
                            break;
                        }

                        // 整组已被占用，连续段中断
                        if bits == u64::MAX {
                            run = 0;
                            continue;
                        }

                        for ingroup_index in 0..64.min(self.len - base) {
                            if bits & (1 << ingroup_index) != 0 {
                                run = 0;
                                continue;
                            }
                            if run == 0 {
                                run_start = base + ingroup_index;
                            }
                            run += 1;
                            if run == required {
                                return Some(run_start as u32);
                            }
                        }
                    }

                    None
                });

            if found.is_some() {
                return found;
            }
        }

        None
    }

    #[inline]
    pub fn test(&self, cache: &BlockCacheManager, id: u32) -> bool {
        let (block_index, group_index, ingroup_index) = BlockID(id).decode();
        cache
            .get(self.start_block_id + block_index)
            .lock()
            .map(0, |bitmap_block: &BitmapBlock| {
                bitmap_block[group_index] & (1 << ingroup_index) != 0
            })
    }

    /// 标记 `[start, start + count)` 为已分配，这些位必须原本空闲
    pub fn set_range(&self, cache: &BlockCacheManager, start: u32, count: u32) {
        for id in start..start + count {
            let (block_index, group_index, ingroup_index) = BlockID(id).decode();
            cache
                .get(self.start_block_id + block_index)
                .lock()
                .map_mut(0, |bitmap_block: &mut BitmapBlock| {
                    assert_eq!(bitmap_block[group_index] & (1 << ingroup_index), 0);
                    bitmap_block[group_index] |= 1 << ingroup_index;
                });
        }
    }

    pub fn dealloc(&self, cache: &BlockCacheManager, id: u32) {
        let (block_index, group_index, ingroup_index) = BlockID(id).decode();
        cache
            .get(self.start_block_id + block_index)
            .lock()
            .map_mut(0, |bitmap_block: &mut BitmapBlock| {
                // 编号一定得有对应的位
                assert_ne!(bitmap_block[group_index] & (1 << ingroup_index), 0);
                bitmap_block[group_index] -= 1 << ingroup_index;
            });
    }

    /// 统计有效范围内的空闲位
    pub fn count_free(&self, cache: &BlockCacheManager) -> u32 {
        (0..self.blocks)
            .map(|block_index| {
                cache
                    .get(self.start_block_id + block_index)
                    .lock()
                    .map(0, |bitmap_block: &BitmapBlock| {
                        bitmap_block
                            .iter()
                            .enumerate()
                            .map(|(group_index, &bits)| {
                                let base = block_index * BLOCK_BITS + group_index * 64;
                                (!bits & self.valid_mask(base, 0)).count_ones()
                            })
                            .sum::<u32>()
                    })
            })
            .sum()
    }
}

impl Bitmap {
    /// 以 `base` 起始的一组 64 位中，落在 `[from, len)` 内的位
    fn valid_mask(&self, base: usize, from: usize) -> u64 {
        let lo = from.saturating_sub(base).min(64);
        let hi = self.len.saturating_sub(base).min(64);
        if lo >= hi {
            return 0;
        }

        let upper = if hi == 64 { u64::MAX } else { (1 << hi) - 1 };
        upper & !((1 << lo) - 1)
    }
}

impl BlockID {
    /// 线性映射编码得到块ID
    #[inline]
    fn encode(block_index: usize, group_index: usize, ingroup_index: usize) -> u32 {
        (block_index * BLOCK_BITS + group_index * 64 + ingroup_index) as u32
    }

    fn decode(self) -> (usize, usize, usize) {
        let mut block_id = self.0 as usize;

        let block_index = block_id / BLOCK_BITS;
        block_id %= BLOCK_BITS;
        (block_index, block_id / 64, block_id % 64)
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use block_dev::RamDisk;

    use super::*;
    use crate::BLOCK_SIZE;

    fn bitmap(len: usize) -> (BlockCacheManager, Bitmap) {
        let cache = BlockCacheManager::new(Arc::new(RamDisk::new(BLOCK_SIZE, 4)));
        (cache, Bitmap::new(1, 2, len))
    }

    #[test]
    fn alloc_respects_start_and_len() {
        let (cache, bitmap) = bitmap(3);
        assert_eq!(bitmap.alloc(&cache, 1), Some(1));
        assert_eq!(bitmap.alloc(&cache, 1), Some(2));
        // 0 号位在 `from` 之前，3 号位越过有效范围
        assert_eq!(bitmap.alloc(&cache, 1), None);
        assert!(!bitmap.test(&cache, 0));
    }

    #[test]
    fn find_run_skips_short_gaps() {
        let (cache, bitmap) = bitmap(200);
        bitmap.set_range(&cache, 0, 2);
        bitmap.set_range(&cache, 4, 1);
        // 2..4 只有两位，不够三位
        assert_eq!(bitmap.find_run(&cache, 2), Some(2));
        assert_eq!(bitmap.find_run(&cache, 3), Some(5));
        assert_eq!(bitmap.find_run(&cache, 196), None);
        assert_eq!(bitmap.find_run(&cache, 195), Some(5));
    }

    #[test]
    fn find_run_crosses_group_and_block_boundaries() {
        let (cache, bitmap) = bitmap(BLOCK_BITS + 10);
        bitmap.set_range(&cache, 0, BLOCK_BITS as u32 - 3);
        assert_eq!(bitmap.find_run(&cache, 8), Some(BLOCK_BITS as u32 - 3));
        assert_eq!(bitmap.find_run(&cache, 14), None);
        assert_eq!(bitmap.count_free(&cache), 13);
    }

    #[test]
    fn dealloc_restores_free_count() {
        let (cache, bitmap) = bitmap(100);
        bitmap.set_range(&cache, 10, 5);
        assert_eq!(bitmap.count_free(&cache), 95);
        bitmap.dealloc(&cache, 12);
        assert!(!bitmap.test(&cache, 12));
        assert_eq!(bitmap.count_free(&cache), 96);
    }
}
