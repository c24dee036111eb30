//! DXA CLI - Command-line tool for DxLib archive extraction.
//!
//! This is the main entry point for the `dxa` command-line application.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use dxa::prelude::*;

/// DXA - DxLib archive extraction tool
#[derive(Parser)]
#[command(name = "dxa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Archive password
    #[arg(short, long, global = true, env = "DXA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Decode entry names with this code page instead of the archive's
    #[arg(long, global = true)]
    code_page: Option<u32>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract files from a DXA archive
    Extract {
        /// Path to the DXA file
        #[arg(short, long)]
        archive: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// List contents of a DXA archive
    List {
        /// Path to the DXA file
        #[arg(short, long)]
        archive: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the archive header
    Info {
        /// Path to the DXA file
        #[arg(short, long)]
        archive: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut options = OpenOptions::new();
    if let Some(password) = cli.password {
        options = options.password(password);
    }
    if let Some(code_page) = cli.code_page {
        options = options.code_page(code_page);
    }

    match cli.command {
        Commands::Extract {
            archive,
            output,
            filter,
        } => {
            cmd_extract(&archive, &output, filter.as_deref(), options)?;
        }
        Commands::List {
            archive,
            filter,
            detailed,
            json,
        } => {
            cmd_list(&archive, filter.as_deref(), detailed, json, options)?;
        }
        Commands::Info { archive } => {
            cmd_info(&archive, options)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(path: &Path, options: OpenOptions) -> Result<DxaArchive> {
    DxaArchive::open_with(path, options)
        .with_context(|| format!("Failed to open DXA archive {}", path.display()))
}

fn cmd_extract(
    archive_path: &Path,
    output: &Path,
    filter: Option<&str>,
    options: OpenOptions,
) -> Result<()> {
    println!("Opening DXA archive: {}", archive_path.display());

    let start = Instant::now();
    let archive = open(archive_path, options)?;

    println!("Loaded {} entries in {:?}", archive.entry_count(), start.elapsed());

    // Collect matching indices
    let indices: Vec<usize> = if let Some(pattern) = filter.map(compile_filter).transpose()? {
        archive
            .iter()
            .enumerate()
            .filter(|(_, e)| glob_match(&pattern, e.path()))
            .map(|(i, _)| i)
            .collect()
    } else {
        (0..archive.entry_count()).collect()
    };

    println!("Extracting {} entries...", indices.len());

    let pb = ProgressBar::new(indices.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    fs::create_dir_all(output)?;

    let start = Instant::now();
    let mut extracted = 0;
    let mut errors = 0;

    archive.extract_parallel(&indices, |_, entry, result| {
        match result.map_err(anyhow::Error::from).and_then(|data| write_entry(output, entry, &data)) {
            Ok(()) => extracted += 1,
            Err(e) => {
                pb.suspend(|| eprintln!("Error extracting {}: {:#}", entry.path(), e));
                errors += 1;
            }
        }
        pb.inc(1);
    })?;

    pb.finish_with_message("Done");
    println!(
        "Extracted {} entries in {:?} ({} errors)",
        extracted,
        start.elapsed(),
        errors
    );

    Ok(())
}

fn write_entry(output: &Path, entry: &DxaEntry, data: &[u8]) -> Result<()> {
    let relative = entry.output_path();
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        anyhow::bail!("refusing to write outside the output directory");
    }

    let output_path = output.join(relative);
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    debug!(path = %output_path.display(), bytes = data.len(), "writing entry");
    fs::write(&output_path, data)
        .with_context(|| format!("Failed to write {}", output_path.display()))
}

fn cmd_list(
    archive_path: &Path,
    filter: Option<&str>,
    detailed: bool,
    json: bool,
    options: OpenOptions,
) -> Result<()> {
    let pattern = filter.map(compile_filter).transpose()?;
    let archive = open(archive_path, options)?;

    let entries: Vec<&DxaEntry> = archive
        .iter()
        .filter(|e| pattern.as_ref().map_or(true, |p| glob_match(p, e.path())))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        if detailed {
            println!(
                "{:>12} {:>12} {}{}{} {}",
                entry.on_disk_size(),
                entry.raw_size(),
                if entry.is_encrypted() { "E" } else { " " },
                if entry.is_huffman_packed() { "H" } else { " " },
                if entry.is_lz_packed() { "L" } else { " " },
                entry.path()
            );
        } else {
            println!("{}", entry.path());
        }
    }

    println!("\nTotal: {} entries", entries.len());

    Ok(())
}

fn cmd_info(archive_path: &Path, options: OpenOptions) -> Result<()> {
    let archive = open(archive_path, options)?;
    let header = archive.header();

    println!("Archive:          {}", archive.name());
    println!("Entries:          {}", archive.entry_count());
    println!("Index size:       {:#x}", header.index_size);
    println!("Index offset:     {:#x}", header.index_offset);
    println!("Base offset:      {:#x}", header.base_offset);
    println!("File table:       {:#x}", header.file_table_offset);
    println!("Directory table:  {:#x}", header.dir_table_offset);
    println!("Code page:        {}", header.code_page);
    println!("Encrypted:        {}", header.flags.is_encrypted());
    println!("Compressed index: {}", !header.flags.no_head_compress);
    match header.huffman_cap() {
        Some(cap) => println!("Huffman cap:      {} bytes", cap),
        None => println!("Huffman cap:      none"),
    }

    Ok(())
}

/// Compile a filter pattern. Either separator is accepted.
fn compile_filter(pattern: &str) -> Result<Pattern> {
    Pattern::new(&pattern.replace('\\', "/"))
        .with_context(|| format!("Invalid glob pattern: {}", pattern))
}

/// Case-insensitive match of an archive path against a compiled filter.
fn glob_match(pattern: &Pattern, path: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    pattern.matches_with(&path.replace('\\', "/"), options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> bool {
        glob_match(&compile_filter(pattern).unwrap(), path)
    }

    #[test]
    fn test_glob_match() {
        assert!(matches("*.png", "img\\Title.PNG"));
        assert!(matches("img/*", "img\\title.png"));
        assert!(matches("img\\*.png", "img\\title.png"));
        assert!(!matches("img/*", "bgm\\img.ogg"));
        assert!(!matches("*.ogg", "img\\title.png"));
        assert!(!matches("title", "img\\title.png"));
    }

    #[test]
    fn test_glob_wildcards() {
        assert!(matches("img/t?tle.png", "img\\title.png"));
        assert!(matches("bgm/[ab].ogg", "bgm\\a.ogg"));
        assert!(matches("BGM/[AB].OGG", "bgm\\b.ogg"));
        assert!(!matches("bgm/[ab].ogg", "bgm\\c.ogg"));
        assert!(matches("**/*.ogg", "bgm\\stage\\a.ogg"));
    }

    #[test]
    fn test_invalid_filter() {
        let err = compile_filter("img/[").unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid glob pattern"));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["dxa", "-vv", "list", "-a", "data.dxa", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::List { json: true, .. }));

        let cli = Cli::try_parse_from([
            "dxa", "extract", "-a", "data.dxa", "-o", "out", "-p", "key", "--code-page", "65001",
        ])
        .unwrap();
        assert_eq!(cli.password.as_deref(), Some("key"));
        assert_eq!(cli.code_page, Some(65001));
    }
}
