use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use flawless_types::CommitId;

#[derive(Parser)]
#[command(
    name = "flawless",
    about = "Flawless: content-addressed version storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', long = "repo", global = true, value_name = "DIR")]
    pub repo: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty repository
    Init(InitArgs),
    /// Show how the working directory differs from the latest commit
    Status(StatusArgs),
    /// Stage files and record a new commit
    Commit(CommitArgs),
    /// Show commit history
    Log(LogArgs),
    /// Show a commit and its files
    Show(ShowArgs),
    /// Print a file as of a commit
    Cat(CatArgs),
    /// Delete depots no commit can reach
    Gc(GcArgs),
    /// Re-read every depot and check its integrity
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
    /// Store file maps as JSON instead of the binary form
    #[arg(long)]
    pub json_file_map: bool,
}

#[derive(Args)]
pub struct StatusArgs {}

#[derive(Args)]
pub struct CommitArgs {
    #[arg(short, long)]
    pub message: Option<String>,
    /// Work Path to drop from the snapshot
    #[arg(long = "remove", value_name = "PATH")]
    pub remove: Vec<String>,
    /// Files or directories to stage
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub id: CommitId,
}

#[derive(Args)]
pub struct CatArgs {
    pub id: CommitId,
    pub path: String,
}

#[derive(Args)]
pub struct GcArgs {
    /// List collectable depots without deleting them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct VerifyArgs {}
