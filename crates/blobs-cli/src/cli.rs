use std::path::PathBuf;

use blobs_store::HashAlgorithm;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobs",
    about = "Content-addressable blob store with staging links and garbage collection",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store root directory
    #[arg(short, long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// TOML file with store configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Digest algorithm (overrides the configuration file)
    #[arg(long, global = true)]
    pub algorithm: Option<HashAlgorithm>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file (or stdin) as an object
    Put(PutArgs),
    /// Write an object's content to stdout
    Cat(IdArgs),
    /// Check whether an object is committed
    Exists(IdArgs),
    /// List committed objects
    Ls,
    /// Remove an object, leaving any links to it dangling
    Rm(IdArgs),
    /// Point a stage path at an object
    Link(LinkArgs),
    /// Remove a staging link
    Unlink(UnlinkArgs),
    /// Show objects reachable from the stage area
    Linked,
    /// Re-hash objects and report corruption
    Verify(VerifyArgs),
    /// Remove objects no staging link reaches
    Gc(GcArgs),
}

#[derive(Args)]
pub struct PutArgs {
    /// File to store; `-` or omitted reads stdin
    pub path: Option<PathBuf>,
    /// Also link the new object at this stage path
    #[arg(short, long)]
    pub link: Option<PathBuf>,
}

#[derive(Args)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Args)]
pub struct LinkArgs {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Args)]
pub struct UnlinkArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Verify a single object instead of the whole store
    pub id: Option<String>,
}

#[derive(Args)]
pub struct GcArgs {
    /// Only collect objects older than this many seconds
    #[arg(long)]
    pub grace: Option<u64>,
    /// Report candidates without removing anything
    #[arg(long)]
    pub dry_run: bool,
    /// Also delete abandoned temp files older than this many seconds
    #[arg(long)]
    pub temp: Option<u64>,
}
