#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::BlockDevice;
use extent_fs::{BLOCK_SIZE, Credentials, ExtentFileSystem, Host, Inode, Timestamp};

/// 以宿主文件充当块设备
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    /// 创建 `blocks` 块大小的镜像，已有的同名文件会被截断
    pub fn create(path: impl AsRef<Path>, blocks: u32) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len(blocks as u64 * BLOCK_SIZE as u64)?;

        Ok(Self(Mutex::new(fd)))
    }

    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self(Mutex::new(fd)))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }
}

/// 宿主时钟，身份由命令行给定
#[derive(Debug, Clone, Copy)]
pub struct SystemHost {
    credentials: Credentials,
}

impl SystemHost {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl Host for SystemHost {
    fn now(&self) -> Timestamp {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::new(since.as_secs(), since.subsec_nanos())
    }

    fn credentials(&self) -> Credentials {
        self.credentials
    }
}

/// 从根目录出发，逐级查找以 `/` 分隔的路径
pub fn resolve(efs: &Arc<spin::Mutex<ExtentFileSystem>>, path: &str) -> io::Result<Inode> {
    let mut inode = ExtentFileSystem::root_inode(efs);
    for name in path.split('/').filter(|name| !name.is_empty() && *name != ".") {
        inode = inode.find(name).map_err(io::Error::other)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{path}: no such file or directory"),
            )
        })?;
    }

    Ok(inode)
}
