//! # 外部协作者
//!
//! 文件系统只向外部目录树索取三样东西：当前时间、请求者身份，
//! 以及把新建 inode 绑定进外部名字缓存的回调。

use core::fmt;

use crate::layout::Timestamp;
use crate::vfs::Stat;

/// 请求者身份
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

pub trait Host: Send + Sync {
    fn now(&self) -> Timestamp;

    fn credentials(&self) -> Credentials;

    /// 新 inode 已写进父目录 `parent`，名为 `name`
    fn bind(&self, _parent: u32, _name: &str, _stat: &Stat) {}
}

impl fmt::Debug for dyn Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Host")
    }
}

/// 时间恒为零、身份恒为 root 的协作者
#[derive(Debug, Default)]
pub struct NullHost;

impl Host for NullHost {
    #[inline]
    fn now(&self) -> Timestamp {
        Timestamp::default()
    }

    #[inline]
    fn credentials(&self) -> Credentials {
        Credentials::default()
    }
}
