use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Build and inspect extent-fs images")]
pub struct Cli {
    /// Owner uid of created files
    #[arg(long, global = true, default_value_t = 0)]
    pub uid: u32,

    /// Owner gid of created files
    #[arg(long, global = true, default_value_t = 0)]
    pub gid: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Format an empty image
    Mkfs {
        #[command(flatten)]
        image: Image,

        #[command(flatten)]
        geometry: Geometry,
    },

    /// Format an image and copy every regular file of a directory into its root
    Pack {
        /// Host source directory
        #[arg(long, short)]
        source: PathBuf,

        #[command(flatten)]
        image: Image,

        #[command(flatten)]
        geometry: Geometry,
    },

    /// List a directory
    Ls {
        #[command(flatten)]
        image: Image,

        #[arg(default_value = "/")]
        dir: String,
    },

    /// Print a file
    Cat {
        #[command(flatten)]
        image: Image,

        file: String,
    },

    /// Show mode, size and extents of an inode
    Stat {
        #[command(flatten)]
        image: Image,

        path: String,
    },

    /// Show block and inode usage
    Df {
        #[command(flatten)]
        image: Image,
    },
}

#[derive(Args)]
pub struct Image {
    /// Image file
    #[arg(long, short)]
    pub image: PathBuf,
}

#[derive(Args)]
pub struct Geometry {
    /// Total blocks of the image
    #[arg(long, default_value_t = 4096)]
    pub blocks: u32,

    /// Inode slots, including the reserved one
    #[arg(long, default_value_t = 256)]
    pub inodes: u32,
}
