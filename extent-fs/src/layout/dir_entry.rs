use crate::{Error, NAME_MAX_LEN, Result};

/// 文件系统项的元信息，`inode_id` 为 0 表示空槽位
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    inode_id: u32,
}

impl DirEntry {
    /// 元信息大小恒为32字节
    pub const SIZE: usize = 32;

    pub fn new(name: &str, inode_id: u32) -> Result<Self> {
        Self::check_name(name)?;
        let bytes = name.as_bytes();

        let mut name = [0; NAME_MAX_LEN + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Ok(Self { name, inode_id })
    }

    /// 名字须能原样存取，且不与 `.` `..` 混淆
    pub fn check_name(name: &str) -> Result<()> {
        if name.len() > NAME_MAX_LEN {
            return Err(Error::NameTooLong);
        }
        if matches!(name, "" | "." | "..") || name.contains('\0') {
            return Err(Error::InvalidName);
        }
        Ok(())
    }

    /// 名字的原始字节，不含结尾的 \0
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        &self.name[..len]
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        core::str::from_utf8(self.name_bytes()).ok()
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.inode_id == 0
    }
}
