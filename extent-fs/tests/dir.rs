use std::sync::{Arc, Mutex};

use block_dev::RamDisk;
use extent_fs::{
    BLOCK_SIZE, Credentials, DirEntryType, Error, ExtentFileSystem, FileKind, Host, NullHost,
    ROOT_INODE, Stat, Timestamp,
};

const NOW: Timestamp = Timestamp::new(1_700_000_000, 250);

#[derive(Default)]
struct RecordingHost {
    bound: Mutex<Vec<(u32, String, u32)>>,
}

impl Host for RecordingHost {
    fn now(&self) -> Timestamp {
        NOW
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            uid: 1000,
            gid: 100,
        }
    }

    fn bind(&self, parent: u32, name: &str, stat: &Stat) {
        self.bound
            .lock()
            .unwrap()
            .push((parent, name.to_owned(), stat.inode));
    }
}

fn volume(total_blocks: u32, inode_count: u32) -> Arc<spin::Mutex<ExtentFileSystem>> {
    let disk = Arc::new(RamDisk::new(BLOCK_SIZE, total_blocks as usize));
    ExtentFileSystem::new(disk, total_blocks, inode_count, Arc::new(NullHost)).unwrap()
}

#[test]
fn create_then_lookup() {
    let host = Arc::new(RecordingHost::default());
    let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 64));
    let efs = ExtentFileSystem::new(disk, 64, 32, host.clone()).unwrap();
    let root = ExtentFileSystem::root_inode(&efs);

    let file = root.create("hello.txt").unwrap();
    assert_eq!(root.lookup("hello.txt").unwrap(), Some(file.id()));
    // 重复查找结果不变
    assert_eq!(root.lookup("hello.txt").unwrap(), Some(file.id()));
    assert_eq!(root.lookup("hello").unwrap(), None);

    let stat = file.stat().unwrap();
    assert_eq!(stat.mode.kind, FileKind::Regular);
    assert_eq!(stat.mode.bits(), 0o100644);
    assert_eq!((stat.uid, stat.gid), (1000, 100));
    assert_eq!((stat.size, stat.links, stat.blocks), (0, 1, 1));
    assert_eq!(stat.extents.len(), 1);
    assert_eq!(stat.mtime, NOW);

    let root_stat = root.stat().unwrap();
    assert_eq!(root_stat.size, 32);
    assert_eq!(root_stat.mtime, NOW);

    assert_eq!(
        *host.bound.lock().unwrap(),
        [(ROOT_INODE, "hello.txt".to_owned(), file.id())]
    );
}

#[test]
fn listing_starts_with_dot_entries() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    let sub = root.mkdir("sub").unwrap();
    root.create("a").unwrap();

    let names: Vec<_> = root
        .read_dir(0)
        .unwrap()
        .map(|dirent| (dirent.name, dirent.ty))
        .collect();
    assert_eq!(
        names,
        [
            (".".to_owned(), DirEntryType::Directory),
            ("..".to_owned(), DirEntryType::Directory),
            ("sub".to_owned(), DirEntryType::Directory),
            ("a".to_owned(), DirEntryType::Regular),
        ]
    );

    let dots: Vec<_> = sub.read_dir(0).unwrap().map(|dirent| dirent.inode).collect();
    assert_eq!(dots, [sub.id(), ROOT_INODE]);
    assert_eq!(sub.stat().unwrap().links, 2);
}

#[test]
fn listing_resumes_from_any_cursor() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    for name in ["a", "b", "c", "d"] {
        root.create(name).unwrap();
    }
    root.symlink("e", "/a").unwrap();

    let full: Vec<_> = root.read_dir(0).unwrap().collect();
    assert_eq!(full.len(), 7);
    for cursor in 0..=full.len() + 1 {
        let rest: Vec<_> = root.read_dir(cursor).unwrap().collect();
        assert_eq!(rest, full[cursor.min(full.len())..], "cursor {cursor}");
    }

    let mut read_dir = root.read_dir(0).unwrap();
    read_dir.by_ref().take(3).for_each(drop);
    assert_eq!(read_dir.cursor(), 3);
    assert_eq!(read_dir.next().map(|dirent| dirent.name), Some("b".to_owned()));
}

#[test]
fn name_length_limit() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    let longest = "n".repeat(27);

    let file = root.create(&longest).unwrap();
    assert_eq!(root.lookup(&longest).unwrap(), Some(file.id()));

    let before = efs.lock().statfs();
    assert_eq!(root.create(&"n".repeat(28)).err(), Some(Error::NameTooLong));
    assert_eq!(root.insert(file.id(), &"n".repeat(28)), Err(Error::NameTooLong));
    assert_eq!(efs.lock().statfs(), before);
}

#[test]
fn duplicate_and_unsupported_create() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    root.create("x").unwrap();

    let before = efs.lock().statfs();
    assert_eq!(root.create("x").err(), Some(Error::AlreadyExists));
    // 字符设备
    assert_eq!(
        root.create_file("dev", 0o020644).err(),
        Some(Error::UnsupportedType)
    );
    assert_eq!(efs.lock().statfs(), before);
    assert_eq!(root.lookup("dev").unwrap(), None);
}

#[test]
fn directory_calls_on_files() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    let file = root.create("plain").unwrap();

    assert_eq!(file.lookup("x"), Err(Error::NotADirectory));
    assert_eq!(file.create("x").err(), Some(Error::NotADirectory));
    assert!(file.read_dir(0).is_err());
}

#[test]
fn full_directory_grows_by_one_extent() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    let target = root.create("f0").unwrap().id();

    // 单块区段可容纳 128 项
    for i in 1..BLOCK_SIZE / 32 {
        root.insert(target, &format!("f{i}")).unwrap();
    }
    assert_eq!(root.stat().unwrap().extents.len(), 1);

    let free = efs.lock().statfs().free_blocks;
    root.insert(target, "overflow").unwrap();

    let stat = root.stat().unwrap();
    assert_eq!(stat.extents.len(), 2);
    assert_eq!(stat.extents[1].block_count, 1);
    assert_eq!(efs.lock().statfs().free_blocks, free - 1);
    assert_eq!(root.lookup("overflow").unwrap(), Some(target));
    assert_eq!(root.lookup("f127").unwrap(), Some(target));
}

#[test]
fn failed_insert_rolls_back_create() {
    // 4 个数据块：根目录 1 块，a、b 各 1 块，剩 1 块
    let efs = volume(8, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    let a = root.create("a").unwrap();
    root.create("b").unwrap();
    for i in 2..BLOCK_SIZE / 32 {
        root.insert(a.id(), &format!("n{i}")).unwrap();
    }

    let before = efs.lock().statfs();
    assert_eq!(before.free_blocks, 1);
    // 新文件拿走最后一块，目录扩充时空间不足
    assert_eq!(root.create("c").err(), Some(Error::NoSpace));
    assert_eq!(efs.lock().statfs(), before);
    assert_eq!(root.lookup("c").unwrap(), None);
}

#[test]
fn create_fails_without_free_blocks() {
    let efs = volume(8, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    for name in ["a", "b", "c"] {
        root.create(name).unwrap();
    }

    let before = efs.lock().statfs();
    assert_eq!(before.free_blocks, 0);
    assert_eq!(root.create("d").err(), Some(Error::NoSpace));
    assert_eq!(efs.lock().statfs(), before);
}

#[test]
fn materialize_needs_allocated_inode() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    let file = root.create("a").unwrap();

    let again = ExtentFileSystem::materialize(&efs, file.id()).unwrap();
    assert_eq!(again.stat().unwrap(), file.stat().unwrap());
    assert_eq!(ExtentFileSystem::materialize(&efs, 0).err(), Some(Error::Fault));
    assert_eq!(ExtentFileSystem::materialize(&efs, 9).err(), Some(Error::Fault));
    assert_eq!(ExtentFileSystem::materialize(&efs, 32).err(), Some(Error::Fault));
}

#[test]
fn insert_takes_first_free_slot() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);

    root.insert(5, "a.txt").unwrap();
    assert_eq!(root.lookup("a.txt").unwrap(), Some(5));

    // 5 号 inode 未分配，类型未知
    let first = root.read_dir(2).unwrap().next().unwrap();
    assert_eq!(first.name, "a.txt");
    assert_eq!(first.inode, 5);
    assert_eq!(first.ty, DirEntryType::Unknown);
}

#[test]
fn names_with_nul_are_rejected() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);
    let a = root.create("a").unwrap();

    let before = efs.lock().statfs();
    assert_eq!(root.create("a\0").err(), Some(Error::InvalidName));
    assert_eq!(root.create("\0b").err(), Some(Error::InvalidName));
    assert_eq!(root.insert(a.id(), "a\0x"), Err(Error::InvalidName));
    assert_eq!(efs.lock().statfs(), before);

    let names: Vec<_> = root.read_dir(2).unwrap().map(|dirent| dirent.name).collect();
    assert_eq!(names, ["a"]);
}

#[test]
fn dot_names_are_reserved() {
    let efs = volume(64, 32);
    let root = ExtentFileSystem::root_inode(&efs);

    let before = efs.lock().statfs();
    assert_eq!(root.create("").err(), Some(Error::InvalidName));
    assert_eq!(root.create(".").err(), Some(Error::InvalidName));
    assert_eq!(root.mkdir("..").err(), Some(Error::InvalidName));
    assert_eq!(root.insert(ROOT_INODE, ".."), Err(Error::InvalidName));
    assert_eq!(efs.lock().statfs(), before);

    // `...` 是普通名字
    root.create("...").unwrap();
    let names: Vec<_> = root.read_dir(0).unwrap().map(|dirent| dirent.name).collect();
    assert_eq!(names, [".", "..", "..."]);
}
