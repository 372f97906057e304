use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbpf::Package;
use log::warn;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "dbpf-tool", about = "Inspect and extract DBPF package archives", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the merged entry table of a package
    List { package: PathBuf },
    /// Extract every payload into a directory
    Extract { package: PathBuf, out_dir: PathBuf },
    /// Walk a directory and summarise every DBPF archive in it
    Scan { dir: PathBuf },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::List { package } => run_list(&package),
        Command::Extract { package, out_dir } => run_extract(&package, &out_dir),
        Command::Scan { dir } => run_scan(&dir),
    }
}

fn run_list(path: &Path) -> Result<()> {
    let package =
        Package::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let entries = package.entries();
    println!(
        "{} ({} entries, group {:08X})",
        path.display(),
        entries.len(),
        package.group_id()
    );
    for entry in &entries {
        let compressed = package.dir().map_or(false, |d| d.contains(&entry.key));
        println!(
            "  {}  offset {:>8}  size {:>8}{}",
            entry.global_key,
            entry.file_offset,
            entry.file_size,
            if compressed { "  (compressed)" } else { "" }
        );
    }
    Ok(())
}

fn run_extract(path: &Path, out_dir: &Path) -> Result<()> {
    let mut package =
        Package::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let entries = package.entries();
    let mut written = 0usize;
    for entry in &entries {
        let Some(bytes) = package.get_bytes(entry)? else {
            continue;
        };
        let name = format!(
            "{:08X}_{:08X}_{:08X}{:08X}.dat",
            entry.global_key.type_id,
            entry.global_key.group_id,
            entry.global_key.instance_hi,
            entry.global_key.instance_id
        );
        fs::write(out_dir.join(name), bytes)?;
        written += 1;
    }
    println!("extracted {written} entries to {}", out_dir.display());
    Ok(())
}

fn run_scan(dir: &Path) -> Result<()> {
    let paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("package") | Some("dat")
            )
        })
        .collect();

    let mut rows: Vec<(PathBuf, usize, usize)> = paths
        .par_iter()
        .filter_map(|p| match Package::open(p) {
            Ok(package) => {
                let total = package.entries().len();
                let compressed = package.dir().map_or(0, |d| d.len());
                Some((p.clone(), total, compressed))
            }
            Err(e) => {
                warn!("skipping {}: {e}", p.display());
                None
            }
        })
        .collect();
    rows.sort();

    for (p, total, compressed) in &rows {
        println!("{total:>6} entries  {compressed:>6} compressed  {}", p.display());
    }
    println!("{} packages", rows.len());
    Ok(())
}
