use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 空闲块或空闲 inode 耗尽
    NoSpace,
    /// 空闲块总数尚够，但找不到足够长的连续空闲块
    NoContiguousSpace,
    /// inode 的区段槽位已满
    ExtentSlotsExhausted,
    NameTooLong,
    /// 空名、`.`、`..` 或含有 \0 的名字
    InvalidName,
    UnsupportedType,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    /// 内部不一致，例如位图声称已分配的 inode 找不到记录
    Fault,
    InvalidSuperBlock,
    /// 卷的几何参数放不下各个区域
    BadGeometry,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NoSpace => "no space left on device",
            Error::NoContiguousSpace => "no contiguous block range available",
            Error::ExtentSlotsExhausted => "no free extent slot in inode",
            Error::NameTooLong => "file name too long",
            Error::InvalidName => "invalid file name",
            Error::UnsupportedType => "unsupported file type",
            Error::AlreadyExists => "file exists",
            Error::NotADirectory => "not a directory",
            Error::IsADirectory => "is a directory",
            Error::Fault => "filesystem inconsistency",
            Error::InvalidSuperBlock => "invalid superblock",
            Error::BadGeometry => "volume too small for requested layout",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
