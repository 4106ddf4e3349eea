//! Command-line inspector for the structural layer of PDF files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_resolve::parser::xref::XRefEntry;
use pdf_resolve::{ObjectId, ParseOptions, PdfReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pdf-resolve",
    version,
    about = "Inspect PDF file structure: xref chains, objects, encryption"
)]
struct Cli {
    /// Fail on recoverable structural warnings instead of continuing
    #[arg(long, global = true)]
    strict: bool,

    /// Password for encrypted files (the empty password is always tried)
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the document: version, revisions, trailer, encryption
    Info {
        /// PDF file to inspect
        file: PathBuf,
    },

    /// Fetch one indirect object and print it
    Object {
        /// PDF file to inspect
        file: PathBuf,

        /// Object number
        number: u32,

        /// Generation number
        #[arg(default_value_t = 0)]
        generation: u16,
    },

    /// Dump the merged cross-reference table
    Xref {
        /// PDF file to inspect
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = if cli.strict {
        ParseOptions::strict()
    } else {
        ParseOptions::lenient()
    };

    match cli.command {
        Commands::Info { file } => {
            let reader = open(&file, options, cli.password.as_deref())?;
            print_info(&reader)
        }
        Commands::Object {
            file,
            number,
            generation,
        } => {
            let mut reader = open(&file, options, cli.password.as_deref())?;
            let object = reader
                .get_object(ObjectId::new(number, generation))
                .with_context(|| format!("failed to fetch object {number} {generation}"))?;
            println!("{object:#?}");
            Ok(())
        }
        Commands::Xref { file } => {
            let reader = open(&file, options, cli.password.as_deref())?;
            print_xref(&reader)
        }
    }
}

fn open(
    path: &Path,
    options: ParseOptions,
    password: Option<&str>,
) -> Result<PdfReader<std::fs::File>> {
    let mut reader = PdfReader::open_with_options(path, options)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if let Some(password) = password {
        reader
            .unlock_with_password(password.as_bytes())
            .context("password authentication failed")?;
    }
    Ok(reader)
}

fn print_info(reader: &PdfReader<std::fs::File>) -> Result<()> {
    println!("Version:   {}", reader.version());
    let encrypted = if reader.is_locked() {
        "yes (password required)"
    } else if reader.is_encrypted() {
        "yes"
    } else {
        "no"
    };
    println!("Encrypted: {encrypted}");

    let trailer = reader.trailer();
    if let Ok(size) = trailer.size() {
        println!("Size:      {size}");
    }
    if let Ok(root) = trailer.root() {
        println!("Root:      {root} R");
    }
    if let Some(info) = trailer.info() {
        println!("Info:      {info} R");
    }
    println!("Objects:   {}", reader.xref_table().len());
    Ok(())
}

fn print_xref(reader: &PdfReader<std::fs::File>) -> Result<()> {
    let mut entries: Vec<_> = reader.xref_table().iter().collect();
    entries.sort_by_key(|(number, _)| **number);

    for (number, entry) in entries {
        match entry {
            XRefEntry::Free {
                next_free,
                generation,
            } => println!("{number:>8}: free (next {next_free}, gen {generation})"),
            XRefEntry::InUse { offset, generation } => {
                println!("{number:>8}: at offset {offset} (gen {generation})")
            }
            XRefEntry::Compressed { container, index } => {
                println!("{number:>8}: in stream {container}[{index}]")
            }
        }
    }
    Ok(())
}
