use anyhow::Context;
use clap::{Parser, Subcommand};
use e2probe_core::InspectOptions;
use e2probe_fs::{Ext2Reader, FileImage, ScanRange};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "e2probe")]
#[command(about = "Read-only inspector for ext2 filesystem images", long_about = None)]
struct Cli {
    /// JSON file with inspection options
    #[arg(short, long, global = true)]
    options: Option<PathBuf>,

    /// Print results as JSON where supported
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the superblock
    Superblock { image: PathBuf },
    /// Show a block group descriptor
    Group { image: PathBuf, group: u32 },
    /// Show an inode
    Inode { image: PathBuf, inode: u32 },
    /// Write a file's content to stdout
    Cat { image: PathBuf, inode: u32 },
    /// Write a raw block to stdout
    Block { image: PathBuf, block: u64 },
    /// Report whether a block is free in its group bitmap
    Free { image: PathBuf, block: u32 },
    /// List the physical block behind each logical block of a file
    Blockmap { image: PathBuf, inode: u32 },
    /// Search a block range for orphaned indirect blocks
    Scan {
        image: PathBuf,
        /// First block to examine
        #[arg(long)]
        start: Option<u32>,
        /// Stop before this block
        #[arg(long)]
        end: Option<u32>,
        /// Worker threads (overrides the options file)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Only examine blocks marked free
        #[arg(long)]
        free_only: bool,
    },
}

fn load_options(path: Option<&Path>) -> anyhow::Result<InspectOptions> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read options file {}", path.display()))?;
            InspectOptions::from_json(&text)
                .with_context(|| format!("Invalid options file {}", path.display()))
        }
        None => Ok(InspectOptions::default()),
    }
}

fn open(image: &Path, options: InspectOptions) -> anyhow::Result<Ext2Reader<FileImage>> {
    Ext2Reader::open_path(image, options)
        .with_context(|| format!("Failed to open ext2 image {}", image.display()))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut options = load_options(cli.options.as_deref())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Superblock { image } => {
            let reader = open(&image, options)?;
            let sb = reader.superblock();
            if cli.json {
                serde_json::to_writer_pretty(&mut out, sb)?;
                writeln!(out)?;
            } else {
                write!(out, "{}", sb)?;
                writeln!(out, "Block groups: {}", sb.group_count())?;
            }
        }
        Commands::Group { image, group } => {
            let reader = open(&image, options)?;
            let desc = reader
                .group_descriptor(group)
                .with_context(|| format!("Failed to read block group {}", group))?;
            if cli.json {
                serde_json::to_writer_pretty(&mut out, &desc)?;
                writeln!(out)?;
            } else {
                writeln!(out, "Group {}:", group)?;
                writeln!(out, "  Block bitmap: {}", desc.block_bitmap)?;
                writeln!(out, "  Inode bitmap: {}", desc.inode_bitmap)?;
                writeln!(out, "  Inode table: {}", desc.inode_table)?;
            }
        }
        Commands::Inode { image, inode } => {
            let reader = open(&image, options)?;
            let record = reader
                .read_inode(inode)
                .with_context(|| format!("Failed to read inode {}", inode))?;
            if cli.json {
                serde_json::to_writer_pretty(&mut out, &record)?;
                writeln!(out)?;
            } else {
                write!(out, "{}", record)?;
                writeln!(out, "Type: {:?}", record.file_type())?;
                writeln!(out, "Blocks: {}", record.block_count(reader.block_size()))?;
            }
        }
        Commands::Cat { image, inode } => {
            let reader = open(&image, options)?;
            let record = reader
                .read_inode(inode)
                .with_context(|| format!("Failed to read inode {}", inode))?;
            let written = reader
                .copy_file_to(&record, &mut out)
                .with_context(|| format!("Failed to read content of inode {}", inode))?;
            log::info!("Wrote {} bytes of inode {}", written, inode);
        }
        Commands::Block { image, block } => {
            let reader = open(&image, options)?;
            let raw = reader
                .read_block(block)
                .with_context(|| format!("Failed to read block {}", block))?;
            out.write_all(&raw)?;
        }
        Commands::Free { image, block } => {
            let reader = open(&image, options)?;
            let free = reader
                .is_block_free(block)
                .with_context(|| format!("Failed to check block {}", block))?;
            writeln!(out, "Block {}: {}", block, if free { "free" } else { "allocated" })?;
        }
        Commands::Blockmap { image, inode } => {
            let reader = open(&image, options)?;
            let record = reader
                .read_inode(inode)
                .with_context(|| format!("Failed to read inode {}", inode))?;
            let map = reader
                .block_map(&record)
                .with_context(|| format!("Failed to map blocks of inode {}", inode))?;
            if cli.json {
                serde_json::to_writer_pretty(&mut out, &map)?;
                writeln!(out)?;
            } else {
                for (logical, physical) in map.iter().enumerate() {
                    match physical {
                        Some(block) => writeln!(out, "{:>8} -> {}", logical, block)?,
                        None => writeln!(out, "{:>8} -> hole", logical)?,
                    }
                }
            }
        }
        Commands::Scan {
            image,
            start,
            end,
            workers,
            free_only,
        } => {
            if let Some(workers) = workers {
                options.scan_workers = workers;
            }
            let reader = open(&image, options)?;
            let whole = ScanRange::whole(reader.superblock());
            let range = ScanRange {
                start: start.unwrap_or(whole.start),
                end: end.unwrap_or(whole.end),
                free_only,
            };
            let found = reader
                .scan_indirect_blocks(range)
                .context("Indirect block scan failed")?;
            if cli.json {
                serde_json::to_writer_pretty(&mut out, &found)?;
                writeln!(out)?;
            } else if found.is_empty() {
                writeln!(out, "No indirect block candidates found.")?;
            } else {
                for candidate in &found {
                    writeln!(out, "{:>10} {:?}", candidate.block, candidate.kind)?;
                }
                writeln!(out, "\n{} candidate(s)", found.len())?;
            }
        }
    }

    out.flush()?;
    Ok(())
}
