use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::*;
use camino::Utf8Path;
use log::*;
use memmap2::Mmap;
use rayon::prelude::*;
use structopt::*;

use aaf::read::{extraction_path, AssetArchive};
use aaf::write::ArchiveWriter;
use aaf::Compression;

#[derive(Debug, StructOpt)]
#[structopt(name = "aaf-tool", about = "Packs, lists, and extracts .aaf asset archives")]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Packs files into a new archive, each named after its file name
    Pack {
        /// Where to write the archive
        #[structopt(short, long)]
        output: PathBuf,

        /// zlib-compress every file
        #[structopt(short = "z", long)]
        compress: bool,

        /// Compression level, 0-9 (implies --compress)
        #[structopt(long)]
        level: Option<u32>,

        #[structopt(name("FILE"), required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Prints the names of the entries in an archive
    List {
        /// Also print each entry's name hash, offset, and stored size
        #[structopt(short, long)]
        long: bool,

        #[structopt(name("AAF file"))]
        archive: PathBuf,
    },

    /// Extracts entries (or all of them) into a directory
    Extract {
        /// Directory to extract into
        #[structopt(short = "C", long, default_value = ".")]
        directory: PathBuf,

        #[structopt(name("AAF file"))]
        archive: PathBuf,

        /// Entries to extract. Extracts everything if none are given.
        names: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    match args.command {
        Command::Pack {
            output,
            compress,
            level,
            inputs,
        } => pack(&output, compress, level, &inputs),
        Command::List { long, archive } => with_archive(&archive, |a| list(a, long)),
        Command::Extract {
            directory,
            archive,
            names,
        } => with_archive(&archive, |a| extract(a, &directory, &names)),
    }
}

fn pack(output: &Path, compress: bool, level: Option<u32>, inputs: &[PathBuf]) -> Result<()> {
    let mut writer = match level {
        Some(l) if l > 9 => bail!("Compression level {} is out of range (0-9)", l),
        Some(l) => ArchiveWriter::with_compression(Compression::new(l)),
        None => ArchiveWriter::new(compress),
    };
    for input in inputs {
        let entry = writer
            .add_file(input)
            .with_context(|| format!("Couldn't add {}", input.display()))?;
        info!("Packed {} ({} bytes stored)", entry.name, entry.size);
    }
    writer
        .write_to_path(output)
        .with_context(|| format!("Couldn't write {}", output.display()))
}

/// Memory maps the archive so only the entries we extract get paged in.
fn with_archive<F>(archive_path: &Path, f: F) -> Result<()>
where
    F: FnOnce(&AssetArchive) -> Result<()>,
{
    info!("Memory mapping {:#?}", archive_path);
    let archive_file = File::open(archive_path).context("Couldn't open archive")?;
    let mapping = unsafe { Mmap::map(&archive_file).context("Couldn't mmap archive")? };

    let archive = AssetArchive::new(&mapping).context("Couldn't load archive")?;
    f(&archive)
}

fn list(archive: &AssetArchive, long: bool) -> Result<()> {
    for entry in archive.entries() {
        if long {
            println!(
                "{:08x} {:>12} {:>12} {}",
                entry.name_hash, entry.offset, entry.size, entry.name
            );
        } else {
            println!("{}", entry.name);
        }
    }
    Ok(())
}

fn extract(archive: &AssetArchive, directory: &Path, names: &[String]) -> Result<()> {
    let directory = Utf8Path::from_path(directory)
        .with_context(|| format!("{} isn't a UTF-8 path", directory.display()))?;

    let names: Vec<&str> = if names.is_empty() {
        archive.list()
    } else {
        names.iter().map(String::as_str).collect()
    };

    names.par_iter().try_for_each(|name| {
        let dest = extraction_path(directory, name)?;
        archive
            .extract_to(name, &dest)
            .with_context(|| format!("Couldn't extract {}", name))?;
        debug!("Extracted {}", dest);
        Ok(())
    })
}
