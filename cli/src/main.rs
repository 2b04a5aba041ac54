use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use vsqpack::{ttmp, AddResult, PathSpec, VirtualSqPack};

#[derive(clap::Args)]
/// Assembles a virtual archive and writes its streams into a directory
struct Build {
    /// Directory the index1/index2/dat files are written into
    output: PathBuf,

    #[arg(long, default_value = "ffxiv")]
    /// Expansion the archive belongs to
    expansion: String,

    #[arg(long, default_value = "000000")]
    /// Archive name, e.g. 040000
    name: String,

    #[arg(long, default_value_t = 2_000_000_000)]
    /// Maximum size of one dat file in bytes
    max_file_size: u64,

    #[arg(long)]
    /// Base archive to layer mods over, given as the path of its .index file
    base: Option<PathBuf>,

    #[arg(long)]
    /// Directory of loose files, added under their directory-relative paths
    loose: Option<PathBuf>,

    #[arg(long = "ttmp")]
    /// Extracted TTMP package directories, applied in order
    ttmps: Vec<PathBuf>,

    #[arg(short, long)]
    /// Sign every header with its SHA-1, like the game's own archives
    strict: bool,
}

#[derive(clap::Args)]
/// Prints the contents of an extracted TTMP package
struct Inspect {
    ttmp: PathBuf,
}

#[derive(clap::Subcommand)]
enum Command {
    Build(Build),
    Inspect(Inspect),
}

#[derive(Parser)]
#[command(author, version, about)]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

fn write_stream(
    path: &Path,
    len: u64,
    mut read: impl FnMut(u64, &mut [u8]) -> Result<usize, vsqpack::ReadError>,
) -> Result<(), anyhow::Error> {
    let bar = ProgressBar::new(len)
        .with_style(ProgressStyle::with_template(
            "{prefix:.bold} {bar:32} {bytes}/{total_bytes}",
        )?)
        .with_prefix(path.file_name().unwrap().to_string_lossy().into_owned());

    let mut file = File::create(path)
        .with_context(|| format!("Could not create output file {}", path.display()))?;
    let mut buf = vec![0u8; 1 << 20];
    let mut offset = 0u64;
    while offset < len {
        let got = read(offset, &mut buf)?;
        if got == 0 {
            bail!("stream ended early at offset {offset}");
        }
        file.write_all(&buf[..got])?;
        offset += got as u64;
        bar.set_position(offset);
    }
    bar.finish();

    Ok(())
}

fn build(opts: Build) -> Result<(), anyhow::Error> {
    let mut pack = VirtualSqPack::new(opts.expansion, opts.name, opts.max_file_size)
        .context("Could not create builder")?;
    let mut totals = AddResult::default();

    if let Some(base) = &opts.base {
        totals += pack
            .add_entries_from_sqpack(base, false, true)
            .with_context(|| format!("Could not ingest base archive {}", base.display()))?;
    }

    if let Some(loose) = &opts.loose {
        for result in walkdir::WalkDir::new(loose) {
            let entry = result?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(loose)
                .expect("walked path not under its root")
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            totals += pack
                .add_file(PathSpec::from_path(&relative), entry.path(), true)
                .with_context(|| format!("Could not add {}", entry.path().display()))?;
        }
    }

    for dir in &opts.ttmps {
        totals += pack
            .add_entries_from_ttmp(dir, true)
            .with_context(|| format!("Could not ingest mod package {}", dir.display()))?;
    }

    pack.freeze(opts.strict).context("Could not freeze archive")?;
    println!(
        "{} entries ({} added, {} replaced, {} skipped), {} data files",
        pack.entry_count(),
        totals.added.len(),
        totals.replaced.len(),
        totals.skipped_existing.len(),
        pack.data_file_count(),
    );

    std::fs::create_dir_all(&opts.output).context("Could not create output directory")?;
    let stream_path =
        |extension: &str| opts.output.join(format!("{}.win32.{extension}", pack.name()));

    write_stream(&stream_path("index"), pack.size_index1()?, |offset, buf| {
        pack.read_index1(offset, buf)
    })?;
    write_stream(&stream_path("index2"), pack.size_index2()?, |offset, buf| {
        pack.read_index2(offset, buf)
    })?;
    for span in 0..pack.data_file_count() as u32 {
        write_stream(
            &stream_path(&format!("dat{span}")),
            pack.size_data(span)?,
            |offset, buf| pack.read_data(span, offset, buf),
        )?;
    }

    Ok(())
}

fn inspect(opts: Inspect) -> Result<(), anyhow::Error> {
    let manifest = ttmp::Manifest::from_file(&opts.ttmp.join("TTMPL.mpl"))
        .context("Could not read TTMPL manifest")?;

    println!(
        "{}",
        console::style(manifest.name.as_deref().unwrap_or("<unnamed pack>")).bold()
    );
    for entry in &manifest.simple_mods_list {
        println!(
            "  {} ({}, {} bytes)",
            entry.full_path,
            entry.dat_file,
            entry.mod_size
        );
    }
    for (page_index, page) in manifest.mod_pack_pages.iter().enumerate() {
        println!("{}", console::style(format!("page {page_index}")).bold());
        for group in &page.mod_groups {
            println!(
                "  {}",
                console::style(group.group_name.as_deref().unwrap_or("<unnamed group>")).underlined()
            );
            for (option_index, option) in group.option_list.iter().enumerate() {
                println!(
                    "    [{option_index}] {}",
                    option.name.as_deref().unwrap_or("<unnamed option>")
                );
                for entry in &option.mods_jsons {
                    println!(
                        "        {} ({}, {} bytes)",
                        entry.full_path,
                        entry.dat_file,
                        entry.mod_size
                    );
                }
            }
        }
    }

    Ok(())
}

fn real_main() -> Result<ExitCode, anyhow::Error> {
    let opts = Opts::parse();

    match opts.command {
        Command::Build(build_opts) => build(build_opts)?,
        Command::Inspect(inspect_opts) => inspect(inspect_opts)?,
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    env_logger::builder()
        .format(|f, record| {
            for line in record.args().to_string().split('\n') {
                write!(
                    f,
                    "{}",
                    match record.level() {
                        log::Level::Error => console::style("error").red(),
                        log::Level::Warn => console::style(" warn").yellow(),
                        log::Level::Info => console::style(" info").blue(),
                        log::Level::Debug => console::style("debug").magenta(),
                        log::Level::Trace => console::style("trace").white(),
                    }
                    .bold()
                )?;
                write!(f, "({})", record.target())?;
                writeln!(f, ": {line}")?;
            }

            Ok(())
        })
        .filter_level({
            #[cfg(debug_assertions)]
            let v = log::LevelFilter::Debug;
            #[cfg(not(debug_assertions))]
            let v = log::LevelFilter::Info;
            v
        })
        .parse_env("VSQPACK_LOG")
        .init();

    match real_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("\x1b[31;1merror\x1b[0m: {err:#}");
            ExitCode::FAILURE
        }
    }
}
