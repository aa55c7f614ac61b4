mod cli;

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command, Geometry, Image};
use extent_fs::{BLOCK_SIZE, Credentials, DirEntryType, ExtentFileSystem, Host};
use extent_fs_fuse::{BlockFile, SystemHost, resolve};
use log::{info, warn};
use spin::Mutex;
use typed_bytesize::ByteSizeIec;

type Volume = Arc<Mutex<ExtentFileSystem>>;

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let host: Arc<dyn Host> = Arc::new(SystemHost::new(Credentials {
        uid: cli.uid,
        gid: cli.gid,
    }));

    match cli.command {
        Command::Mkfs { image, geometry } => {
            format(&image, &geometry, host)?;
        }
        Command::Pack {
            source,
            image,
            geometry,
        } => {
            let efs = format(&image, &geometry, host)?;
            let root = ExtentFileSystem::root_inode(&efs);

            for entry in fs::read_dir(&source)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                    warn!("skipping non UTF-8 name {:?}", entry.file_name());
                    continue;
                };

                let data = fs::read(entry.path())?;
                let inode = match root.create(&name) {
                    Ok(inode) => inode,
                    Err(err) => {
                        warn!("skipping {name:?}: {err}");
                        continue;
                    }
                };
                match inode.write_at(0, &data) {
                    Ok(_) => info!("packed {name:?}, {} bytes", data.len()),
                    Err(err) => {
                        let kept = inode.stat().map_err(io::Error::other)?.size;
                        warn!("{name:?} truncated to {kept} of {} bytes: {err}", data.len());
                    }
                }
                println!("{name}");
            }
        }
        Command::Ls { image, dir } => {
            let efs = open(&image, host)?;
            let dir = resolve(&efs, &dir)?;
            for dirent in dir.read_dir(0).map_err(io::Error::other)? {
                let ty = match dirent.ty {
                    DirEntryType::Directory => 'd',
                    DirEntryType::Regular => '-',
                    DirEntryType::SymLink => 'l',
                    DirEntryType::Unknown => '?',
                };
                println!("{ty} {:>6} {}", dirent.inode, dirent.name);
            }
        }
        Command::Cat { image, file } => {
            let efs = open(&image, host)?;
            let data = resolve(&efs, &file)?.read_all().map_err(io::Error::other)?;
            io::stdout().write_all(&data)?;
        }
        Command::Stat { image, path } => {
            let efs = open(&image, host)?;
            let inode = resolve(&efs, &path)?;
            let stat = inode.stat().map_err(io::Error::other)?;

            println!("inode: {}", stat.inode);
            println!("mode: {:06o} {:?}", stat.mode.bits(), stat.mode.kind);
            println!("owner: {}:{}", stat.uid, stat.gid);
            println!("size: {}", stat.size);
            println!("blocks: {}", stat.blocks);
            println!("links: {}", stat.links);
            println!("mtime: {}.{:09}", stat.mtime.secs, stat.mtime.nanos);
            for (slot, extent) in stat.extents.iter().enumerate() {
                println!(
                    "extent #{slot}: {}..{}",
                    extent.start_block,
                    extent.end_block()
                );
            }
            if let Ok(target) = inode.read_link() {
                println!("target: {target}");
            }
        }
        Command::Df { image } => {
            let efs = open(&image, host)?;
            let stat = efs.lock().statfs();
            let bytes = |blocks: u32| ByteSizeIec(blocks as u64 * stat.block_size as u64);

            println!(
                "blocks: {} free of {} ({} free of {})",
                stat.free_blocks,
                stat.data_blocks,
                bytes(stat.free_blocks),
                bytes(stat.data_blocks)
            );
            println!(
                "inodes: {} free of {}",
                stat.free_inodes,
                stat.inode_count - 1
            );
        }
    }

    Ok(())
}

fn format(image: &Image, geometry: &Geometry, host: Arc<dyn Host>) -> io::Result<Volume> {
    let block_file = Arc::new(BlockFile::create(&image.image, geometry.blocks)?);
    let efs = ExtentFileSystem::new(block_file, geometry.blocks, geometry.inodes, host)
        .map_err(io::Error::other)?;
    info!(
        "{:?}: {} of {BLOCK_SIZE}-byte blocks",
        image.image,
        ByteSizeIec(geometry.blocks as u64 * BLOCK_SIZE as u64)
    );

    Ok(efs)
}

fn open(image: &Image, host: Arc<dyn Host>) -> io::Result<Volume> {
    let block_file = Arc::new(BlockFile::open(&image.image)?);
    ExtentFileSystem::open(block_file, host).map_err(io::Error::other)
}
