use clap::{Args, Parser, Subcommand};
use comic_merge::{parse_byte_size, ArchiveFormat, DiscoveryOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cmerge")]
#[command(about = "A CLI tool for merging multiple comic archives into one or more .cbz files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// More information as to the merging progress
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge comics into one or more archives
    Merge(MergeArgs),

    /// Show the pages and chunks a merge would produce without writing
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
pub struct InputArgs {
    /// Comics to merge, in order. If empty, the folder is searched instead
    #[arg(value_name = "SOURCE")]
    pub sources: Vec<PathBuf>,

    /// Input folder for comics
    #[arg(short, long, default_value = ".")]
    pub folder: PathBuf,

    /// Filename prefix filter to restrict input comics
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Range of comics in the folder to merge (1-based, inclusive)
    #[arg(short, long, num_args = 2, value_names = ["START", "END"])]
    pub range: Option<Vec<usize>>,

    /// Look for .cbr files instead of .cbz
    #[arg(long)]
    pub cbr: bool,
}

impl InputArgs {
    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            folder: self.folder.clone(),
            format: if self.cbr {
                ArchiveFormat::Cbr
            } else {
                ArchiveFormat::Cbz
            },
            prefix: self.prefix.clone(),
            range: self.range.as_ref().and_then(|r| match r.as_slice() {
                [start, end] => Some((*start, *end)),
                _ => None,
            }),
        }
    }
}

#[derive(Args)]
pub struct ChunkArgs {
    /// Don't flatten the comics, keep each source as a chapter folder
    #[arg(short, long)]
    pub chapters: bool,

    /// Maximum chapters per output file (requires --chapters)
    #[arg(long, value_name = "N")]
    pub max_chapters: Option<usize>,

    /// Maximum size per output file, e.g. 200MB or 1.5GiB
    #[arg(short = 'm', long, value_name = "SIZE", value_parser = parse_size_arg)]
    pub max_size: Option<u64>,
}

#[derive(Args)]
pub struct MergeArgs {
    /// Name of the .cbz file to create. `.cbz` is appended when missing
    #[arg(required = true, value_name = "OUTPUT")]
    pub output: PathBuf,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub chunking: ChunkArgs,

    /// Write a JSON manifest describing the merge next to the output
    #[arg(long)]
    pub manifest: bool,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub chunking: ChunkArgs,

    /// Output name used for the planned file names
    #[arg(short, long, default_value = "merged")]
    pub output: PathBuf,

    /// Output analysis to JSON file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,
}

fn parse_size_arg(value: &str) -> Result<u64, String> {
    parse_byte_size(value).map_err(|e| e.to_string())
}
