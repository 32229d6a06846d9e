use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use fatx::{AddMode, Drive, FolderContents};

#[derive(Debug, Parser)]
#[command(name = "fatxutil", about = "Inspect and edit FATX device images")]
struct Args {
    /// Path to the device image.
    image: PathBuf,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Show the drive kind and partition overview.
    Info,
    /// List a directory, e.g. `Content/Cache` or just `Content`.
    Ls { path: String },
    /// Extract one file to a local path.
    Extract {
        path: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Extract a folder tree to a local directory.
    ExtractDir {
        path: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Add a local file into a folder on the image.
    Add {
        /// Destination folder path on the image.
        path: String,
        /// Local file to add; its file name is used on the image.
        file: PathBuf,
        /// Overwrite an existing file in place instead of failing.
        #[arg(long, conflicts_with = "replace")]
        inject: bool,
        /// Rewrite an existing file onto a fresh chain instead of failing.
        #[arg(long)]
        replace: bool,
    },
    /// Create an empty folder.
    Mkdir { path: String },
    /// Delete a file.
    Rm { path: String },
    /// Rename a file or folder.
    Rename { path: String, new_name: String },
    /// Dump the whole device image to a file.
    DumpImage { output: PathBuf },
    /// Overwrite the device image from a dump.
    RestoreImage { input: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing_subscriber::filter::LevelFilter::DEBUG
        } else {
            tracing_subscriber::filter::LevelFilter::WARN
        })
        .init();

    let mut drive = Drive::open_image(&args.image)
        .with_context(|| format!("opening image {}", args.image.display()))?;

    match args.cmd {
        Command::Info => info(&drive),
        Command::Ls { path } => ls(&drive, &path)?,
        Command::Extract { path, output } => {
            let (folder, name) = split_entry_path(&path)?;
            let contents = drive.read_dir(folder)?;
            let file = contents
                .files
                .iter()
                .find(|f| f.name().eq_ignore_ascii_case(name))
                .with_context(|| format!("no file named {name:?} in {folder:?}"))?;
            file.extract_to_path(&output)?;
            println!("extracted {} ({} bytes)", path, file.size());
        }
        Command::ExtractDir { path, output } => {
            let folder = drive.open_folder(&path)?;
            folder.extract(&output, true)?;
            println!("extracted {path} to {}", output.display());
        }
        Command::Add {
            path,
            file,
            inject,
            replace,
        } => {
            let data = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("file name is not valid UTF-8")?;
            let mode = if inject {
                AddMode::Inject
            } else if replace {
                AddMode::Replace
            } else {
                AddMode::Fail
            };
            let folder = drive.open_folder(&path)?;
            let entry = folder.add_file(name, &data, mode)?;
            println!("added {name} ({} bytes) at block {}", entry.size(), entry.start_block());
        }
        Command::Mkdir { path } => {
            let (parent, name) = split_entry_path(&path)?;
            let folder = drive.open_folder(parent)?;
            folder.add_folder(name)?;
            println!("created folder {path}");
        }
        Command::Rm { path } => {
            let (folder, name) = split_entry_path(&path)?;
            let mut contents = drive.read_dir(folder)?;
            let file = contents
                .files
                .iter_mut()
                .find(|f| f.name().eq_ignore_ascii_case(name))
                .with_context(|| format!("no file named {name:?} in {folder:?}"))?;
            file.delete()?;
            println!("deleted {path}");
        }
        Command::Rename { path, new_name } => {
            let (folder, name) = split_entry_path(&path)?;
            let mut contents = drive.read_dir(folder)?;
            if let Some(file) = contents
                .files
                .iter_mut()
                .find(|f| f.name().eq_ignore_ascii_case(name))
            {
                file.rename(&new_name)?;
            } else if let Some(dir) = contents
                .folders
                .iter_mut()
                .find(|f| f.name().eq_ignore_ascii_case(name))
            {
                dir.rename(&new_name)?;
            } else {
                bail!("no entry named {name:?} in {folder:?}");
            }
            println!("renamed {name} to {new_name}");
        }
        Command::DumpImage { output } => {
            drive.extract_image_to_path(&output)?;
            println!("dumped image to {}", output.display());
        }
        Command::RestoreImage { input } => {
            let mut source = fs::File::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            drive.restore_image(&mut source)?;
            println!("restored image from {}", input.display());
        }
    }

    Ok(())
}

fn info(drive: &Drive) {
    println!("drive kind: {}", drive.kind().name());
    for partition in drive.partitions() {
        println!(
            "  {}: block size {:#x}, {} blocks, {:?} table, {} files, {} folders",
            partition.name(),
            partition.block_size(),
            partition.block_count(),
            partition.table_width(),
            partition.files().len(),
            partition.folders().len(),
        );
        for sub in partition.sub_partitions() {
            println!(
                "    {} (nested): block size {:#x}, {} blocks",
                sub.name(),
                sub.block_size(),
                sub.block_count(),
            );
        }
    }
}

fn ls(drive: &Drive, path: &str) -> anyhow::Result<()> {
    let FolderContents { files, folders } = drive.read_dir(path)?;
    for folder in &folders {
        println!("{:>12}  {:?}  {}/", "-", folder.modified(), folder.name());
    }
    for file in &files {
        println!("{:>12}  {:?}  {}", file.size(), file.modified(), file.name());
    }
    Ok(())
}

/// Splits `Partition/dir/entry` into the containing folder path and the
/// entry name.
fn split_entry_path(path: &str) -> anyhow::Result<(&str, &str)> {
    let trimmed = path.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((folder, name)) if !folder.is_empty() && !name.is_empty() => Ok((folder, name)),
        _ => bail!("path {path:?} must name an entry inside a partition"),
    }
}
