use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use extent_fs::{Credentials, ExtentFileSystem, FileKind, Host};

use super::*;

fn image_path(name: &str) -> PathBuf {
    env::temp_dir().join(format!("extent-fs-{}-{name}.img", std::process::id()))
}

fn host() -> Arc<dyn Host> {
    Arc::new(SystemHost::new(Credentials {
        uid: 1000,
        gid: 1000,
    }))
}

#[test]
fn image_survives_reopen() {
    let path = image_path("reopen");
    let content = b"packed by the host\n".repeat(300);

    {
        let block_file = Arc::new(BlockFile::create(&path, 128).unwrap());
        let efs = ExtentFileSystem::new(block_file, 128, 64, host()).unwrap();
        let root = ExtentFileSystem::root_inode(&efs);
        let bin = root.mkdir("bin").unwrap();
        let app = bin.create("app").unwrap();
        app.write_at(0, &content).unwrap();
    }
    assert_eq!(fs::metadata(&path).unwrap().len(), 128 * BLOCK_SIZE as u64);

    let block_file = Arc::new(BlockFile::open(&path).unwrap());
    let efs = ExtentFileSystem::open(block_file, host()).unwrap();
    let app = resolve(&efs, "/bin/app").unwrap();
    assert_eq!(app.read_all().unwrap(), content);

    let stat = app.stat().unwrap();
    assert_eq!(stat.mode.kind, FileKind::Regular);
    assert_eq!((stat.uid, stat.gid), (1000, 1000));
    assert!(stat.mtime.secs > 0);

    fs::remove_file(path).unwrap();
}

#[test]
fn resolve_walks_components() {
    let path = image_path("resolve");
    let block_file = Arc::new(BlockFile::create(&path, 64).unwrap());
    let efs = ExtentFileSystem::new(block_file, 64, 32, host()).unwrap();
    let root = ExtentFileSystem::root_inode(&efs);
    let usr = root.mkdir("usr").unwrap();
    let lib = usr.mkdir("lib").unwrap();

    assert_eq!(resolve(&efs, "/").unwrap().id(), root.id());
    assert_eq!(resolve(&efs, "usr//lib/.").unwrap().id(), lib.id());
    assert_eq!(
        resolve(&efs, "/usr/bin").err().map(|err| err.kind()),
        Some(io::ErrorKind::NotFound)
    );

    fs::remove_file(path).unwrap();
}
