//! 文件数据：按区段换算逻辑偏移，写入时逐块扩充区段。

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};

use super::Inode;
use crate::layout::FileKind;
use crate::{BLOCK_SIZE, Error, MAX_EXTENTS, Result};

/// 单个文件的最大字节数
const MAX_FILE_SIZE: usize = MAX_EXTENTS * BLOCK_SIZE;

impl Inode {
    /// 从 `offset` 处读入 `buf`，返回读到的字节数，文件末尾之后为空
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let fs = self.fs.lock();
        let data_area = fs.data_area();
        self.on_disk(|disk_inode| {
            if disk_inode.is_dir() {
                return Err(Error::IsADirectory);
            }
            Ok(disk_inode.read_at(offset, buf, &self.cache, data_area))
        })
    }

    /// 读出整个文件
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let size = self.stat()?.size as usize;
        let mut buf = vec![0; size];
        let len = self.read_at(0, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// 从 `offset` 处写入 `buf`。
    ///
    /// 现有区段写满后再预留一块单块区段继续写，直到写完或分配失败。
    /// 分配失败时已写入的字节保留，文件大小覆盖它们，并返回该错误。
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // 区段全为单块，超出此范围的偏移永远写不进去
        if offset >= MAX_FILE_SIZE {
            warn!("write at {offset} beyond {MAX_FILE_SIZE} bytes");
            return Err(Error::ExtentSlotsExhausted);
        }

        let mut fs = self.fs.lock();
        let data_area = fs.data_area();
        let now = fs.host().now();

        let (written, result) = self.on_disk_mut(|disk_inode| {
            if disk_inode.is_dir() {
                return Err(Error::IsADirectory);
            }
            if disk_inode.extents().is_empty() {
                fs.find_and_reserve_extent(1, disk_inode)?;
            }

            let mut written = 0;
            let result = loop {
                written += disk_inode.write_at(
                    offset + written,
                    &buf[written..],
                    &self.cache,
                    data_area,
                );
                if written == buf.len() {
                    break Ok(());
                }

                debug!("inode {}: extents full after {written} bytes", disk_inode.id);
                if let Err(err) = fs.find_and_reserve_extent(1, disk_inode) {
                    warn!(
                        "inode {}: write stopped at {written}/{} bytes: {err}",
                        disk_inode.id,
                        buf.len()
                    );
                    break Err(err);
                }
            };

            if written > 0 {
                disk_inode.mtime = now;
                disk_inode.ctime = now;
            }
            Ok((written, result))
        })?;
        fs.sync();

        result.map(|()| written)
    }

    /// 读出符号链接的目标
    pub fn read_link(&self) -> Result<String> {
        if self.kind()? != FileKind::Symlink {
            return Err(Error::UnsupportedType);
        }
        String::from_utf8(self.read_all()?).map_err(|_| Error::Fault)
    }
}
