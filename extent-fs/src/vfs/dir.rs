//! 目录：区段内紧密排列的定长目录项，`inode_id` 为 0 的是空槽位。
//! 查找、遍历、插入都按区段的槽位顺序、区段内的存放顺序进行。

use alloc::string::String;

use log::{debug, error, info};

use super::{DirEntryType, Dirent, Inode};
use crate::efs::ParentHint;
use crate::layout::{DirEntry, DiskInode, Mode};
use crate::{Error, ExtentFileSystem, Result};

/// 目录的惰性遍历器，可以从任意游标处重新开始。
///
/// 游标 0、1 分别对应 `.` 与 `..`，此后每发出一项游标加一。
pub struct ReadDir<'a> {
    dir: &'a Inode,
    cursor: usize,
    /// 下一个要检查的槽位；`None` 表示还需按游标定位
    slot: Option<usize>,
}

impl Inode {
    /// 根据文件名获取目录项的 inode ID，找不到并非错误
    pub fn lookup(&self, name: &str) -> Result<Option<u32>> {
        let fs = self.fs.lock();
        let data_area = fs.data_area();
        self.on_disk(|disk_inode| {
            if !disk_inode.is_dir() {
                return Err(Error::NotADirectory);
            }
            Ok(self.get(disk_inode, name, data_area))
        })
    }

    /// 根据文件名获取 inode
    pub fn find(&self, name: &str) -> Result<Option<Inode>> {
        let inode_id = self.lookup(name)?;
        let fs = self.fs.lock();
        inode_id.map(|inode_id| self.inode(&fs, inode_id)).transpose()
    }

    pub fn read_dir(&self, cursor: usize) -> Result<ReadDir<'_>> {
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(ReadDir {
            dir: self,
            cursor,
            slot: None,
        })
    }

    /// 把 `name -> inode_id` 写进第一个空槽位；没有空槽位就追加一块区段再试
    pub fn insert(&self, inode_id: u32, name: &str) -> Result<()> {
        let mut fs = self.fs.lock();
        let dir_entry = DirEntry::new(name, inode_id)?;
        self.on_disk_mut(|disk_inode| {
            if !disk_inode.is_dir() {
                return Err(Error::NotADirectory);
            }
            self.insert_entry(disk_inode, &mut fs, dir_entry)
        })?;
        fs.sync();
        Ok(())
    }

    /// 在当前目录下创建子 inode。
    ///
    /// 创建是原子的：目录项写入失败时，新 inode 的编号与区段都会归还。
    pub fn create_file(&self, name: &str, mode: u32) -> Result<Inode> {
        let mut fs = self.fs.lock();
        DirEntry::check_name(name)?;

        let data_area = fs.data_area();
        let hint = self.on_disk(|parent| {
            if !parent.is_dir() {
                return Err(Error::NotADirectory);
            }
            // 确认没有已创建的同名项
            if self.get(parent, name, data_area).is_some() {
                return Err(Error::AlreadyExists);
            }
            Ok(ParentHint {
                id: parent.id,
                mode: parent.mode()?,
                gid: parent.gid,
            })
        })?;

        let inode_id = fs.create(Some(hint), mode)?;
        let now = fs.host().now();
        let inserted: Result<()> = self.on_disk_mut(|parent| {
            self.insert_entry(parent, &mut fs, DirEntry::new(name, inode_id)?)?;
            parent.size += DirEntry::SIZE as u32;
            parent.mtime = now;
            parent.atime = now;
            Ok(())
        });

        if let Err(err) = inserted {
            if let Err(discard_err) = fs.discard(inode_id) {
                error!("failed to roll back inode {inode_id}: {discard_err}");
            }
            fs.sync();
            return Err(err);
        }

        let inode = self.inode(&fs, inode_id)?;
        fs.sync();

        let stat = inode.on_disk(super::Stat::from_disk)?;
        fs.host().bind(hint.id, name, &stat);
        info!("created '{name}' with inode {inode_id} in inode {}", hint.id);

        Ok(inode)
    }

    /// 创建 0o644 的普通文件
    #[inline]
    pub fn create(&self, name: &str) -> Result<Inode> {
        self.create_file(name, Mode::file().bits())
    }

    #[inline]
    pub fn mkdir(&self, name: &str) -> Result<Inode> {
        self.create_file(name, Mode::dir().bits())
    }

    /// 创建指向 `target` 的符号链接，目标路径作为文件数据存放
    pub fn symlink(&self, name: &str, target: &str) -> Result<Inode> {
        let inode = self.create_file(name, Mode::symlink().bits())?;
        inode.write_at(0, target.as_bytes())?;
        Ok(inode)
    }
}

impl Inode {
    /// 在 DiskInode 下通过名字获取目录项的inode ID
    fn get(&self, disk_inode: &DiskInode, name: &str, data_area: u32) -> Option<u32> {
        let name = name.as_bytes();
        (0..disk_inode.entry_capacity()).find_map(|slot| {
            disk_inode
                .dir_entry(slot, &self.cache, data_area)
                .filter(|dir_entry| !dir_entry.is_free() && dir_entry.name_bytes() == name)
                .map(|dir_entry| dir_entry.inode_id())
        })
    }

    /// 在当前目录的数据当中，寻找空槽位写入；找不到就追加一块区段。
    /// 区段槽位或空间耗尽时由分配器报错。
    fn insert_entry(
        &self,
        disk_inode: &mut DiskInode,
        fs: &mut ExtentFileSystem,
        dir_entry: DirEntry,
    ) -> Result<()> {
        let data_area = fs.data_area();
        loop {
            let free_slot = (0..disk_inode.entry_capacity()).find(|&slot| {
                disk_inode
                    .dir_entry(slot, &self.cache, data_area)
                    .is_some_and(|dir_entry| dir_entry.is_free())
            });

            if let Some(slot) = free_slot {
                debug!(
                    "inode {}: entry '{}' -> {} at slot {slot}",
                    disk_inode.id,
                    dir_entry.name().unwrap_or("?"),
                    dir_entry.inode_id()
                );
                return disk_inode.set_dir_entry(slot, dir_entry, &self.cache, data_area);
            }

            info!("inode {}: no free entry, allocating new extent", disk_inode.id);
            fs.find_and_reserve_extent(1, disk_inode)?;
        }
    }
}

impl ReadDir<'_> {
    /// 下一项对应的游标
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Iterator for ReadDir<'_> {
    type Item = Dirent;

    fn next(&mut self) -> Option<Self::Item> {
        let dir = self.dir;
        let fs = dir.fs.lock();
        let data_area = fs.data_area();

        let (id, parent) = dir.on_disk(|disk_inode| (disk_inode.id, disk_inode.parent));
        match self.cursor {
            0 => {
                self.cursor += 1;
                return Some(Dirent::new(".", id, DirEntryType::Directory));
            }
            1 => {
                self.cursor += 1;
                return Some(Dirent::new("..", parent, DirEntryType::Directory));
            }
            _ => {}
        }

        let found = dir.on_disk(|disk_inode| {
            let capacity = disk_inode.entry_capacity();
            let occupied = |slot: &usize| {
                disk_inode
                    .dir_entry(*slot, &dir.cache, data_area)
                    .filter(|dir_entry| !dir_entry.is_free())
            };

            // 首次越过 `.` `..`：跳过游标之前已发出的项
            let start = match self.slot {
                Some(slot) => slot,
                None if self.cursor == 2 => 0,
                None => (0..capacity)
                    .filter(|slot| occupied(slot).is_some())
                    .nth(self.cursor - 3)
                    .map_or(capacity, |slot| slot + 1),
            };

            let found = (start..capacity).find_map(|slot| occupied(&slot).map(|e| (slot, e)));
            self.slot = Some(found.as_ref().map_or(capacity, |(slot, _)| slot + 1));
            found.map(|(_, dir_entry)| dir_entry)
        })?;

        let ty = fs
            .live_record(found.inode_id())
            .ok()
            .and_then(|(block_id, block_offset)| {
                dir.cache
                    .get(block_id as usize)
                    .lock()
                    .map(block_offset, |disk_inode: &DiskInode| disk_inode.mode().ok())
            })
            .map_or(DirEntryType::Unknown, |mode| mode.kind.into());

        self.cursor += 1;
        Some(Dirent {
            inode: found.inode_id(),
            ty,
            name: String::from_utf8_lossy(found.name_bytes()).into_owned(),
        })
    }
}

impl Dirent {
    #[inline]
    fn new(name: &str, inode: u32, ty: DirEntryType) -> Self {
        Self {
            inode,
            ty,
            name: name.into(),
        }
    }
}
