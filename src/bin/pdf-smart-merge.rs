//! PDF Smart Merge CLI tool
//!
//! A command-line tool for merging PDFs with shared resources and inspecting
//! their structure.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use glob::glob;
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process;

use pdf_smart_merge::pdf::{
    extract_metadata, inspect_file, merge_pdfs, InspectOptions, MergeInput, MergeOptions,
};

/// PDF Smart Merge - Merge PDFs sharing identical fonts and images
#[derive(Parser)]
#[command(name = "pdf-smart-merge")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge numbered PDFs in order
    pdf-smart-merge merge -o handout.pdf \"[0-9]*.pdf\"

    # Take pages 2-3 of the first file and all of the second
    pdf-smart-merge merge -o out.pdf intro.pdf:2-3 body.pdf

    # Merge three copies of a document and open the result
    pdf-smart-merge merge -o Merged-3.pdf --copies 3 --open in.pdf

    # Show the structure of a PDF including content streams
    pdf-smart-merge inspect --streams in.pdf")]
struct Cli {
    /// Increase log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge multiple PDF files into one, sharing identical resources
    Merge {
        /// Input PDF files (in order), each optionally suffixed with :FIRST-LAST
        /// or :N to select pages. Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Repeat the whole input list this many times
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        copies: u32,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Print the internal structure of a PDF
    Inspect {
        /// PDF file to inspect
        input: PathBuf,

        /// Dump the decoded content streams of every page
        #[arg(long)]
        streams: bool,

        /// List every indirect object (default)
        #[arg(long, overrides_with = "no_objects")]
        objects: bool,

        /// Do not list indirect objects
        #[arg(long, overrides_with = "objects")]
        no_objects: bool,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Merge { inputs, output, copies, open } => {
            cmd_merge(inputs, output, copies, open)
        }
        Commands::Inspect { input, streams, objects: _, no_objects } => {
            cmd_inspect(input, streams, !no_objects)
        }
        Commands::Info { input } => {
            cmd_info(input)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Expand glob patterns in input paths, keeping any page-range suffix
fn expand_globs(patterns: Vec<String>) -> Result<Vec<MergeInput>> {
    let mut inputs = Vec::new();

    for pattern in patterns {
        let input: MergeInput = pattern
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Invalid input {}: {}", pattern, e))?;
        let path = input.path.to_string_lossy().into_owned();

        // Check if pattern contains glob characters
        if path.contains('*') || path.contains('?') || path.contains('[') {
            let mut matched: Vec<PathBuf> = glob(&path)
                .with_context(|| format!("Invalid glob pattern {}", path))?
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        eprintln!("Warning: glob error for {}: {}", pattern, e);
                        None
                    }
                })
                .collect();

            if matched.is_empty() {
                bail!("No files matched pattern: {}", path);
            }

            // Sort matches for consistent ordering
            matched.sort();
            inputs.extend(matched.into_iter().map(|path| MergeInput { path, range: input.range }));
        } else {
            inputs.push(input);
        }
    }

    Ok(inputs)
}

/// Open a file with the system default application
fn open_file(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(path)
            .spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(path)
            .spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }

    Ok(())
}

/// Merge multiple PDFs into one
fn cmd_merge(inputs: Vec<String>, output: PathBuf, copies: u32, open: bool) -> Result<()> {
    // Expand glob patterns
    let inputs = expand_globs(inputs)?;

    // Validate inputs exist
    for input in &inputs {
        if !input.path.exists() {
            bail!("Input file not found: {}", input.path.display());
        }
    }

    let repeated: Vec<MergeInput> = (0..copies).flat_map(|_| inputs.iter().cloned()).collect();
    eprintln!("Merging {} PDF files...", repeated.len());

    let options = MergeOptions {
        inputs: repeated,
        output_path: output.clone(),
    };
    let report = merge_pdfs(&options)
        .with_context(|| format!("Failed to merge into {}", output.display()))?;

    println!("{}", report);
    eprintln!("Merged to: {}", output.display());

    if open {
        open_file(&output)?;
    }

    Ok(())
}

/// Print the inspection report of a PDF
fn cmd_inspect(input: PathBuf, streams: bool, objects: bool) -> Result<()> {
    let options = InspectOptions {
        print_streams: streams,
        list_objects: objects,
    };
    let report = inspect_file(&input, &options)
        .with_context(|| format!("Failed to inspect {}", input.display()))?;
    print!("{}", report);
    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> Result<()> {
    let metadata = extract_metadata(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);
    println!("PDF version: {}", metadata.version);
    println!("Cross-reference: {}", metadata.layout);

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }

    Ok(())
}
