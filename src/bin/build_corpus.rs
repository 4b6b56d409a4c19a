//! Corpus builder binary entry point.
//!
//! This binary runs the offline conversion pipeline: it scans raw pasted
//! curriculum text for grade/subject headers and bracketed standard lines,
//! and writes the nested JSON corpus the recommender consumes. It can also
//! emit or consume the intermediate flat comma-delimited text format.
//!
//! # Examples
//!
//! Build an elementary corpus from raw text:
//! ```bash
//! build_corpus --input raw_standards.txt --level elementary --output achievement_standards.json
//! ```
//!
//! Keep the intermediate flat file alongside the JSON:
//! ```bash
//! build_corpus --input raw_standards.txt --level elementary \
//!     --output achievement_standards.json --flat-output achievement_standards.txt
//! ```
//!
//! Rebuild the JSON from a previously emitted flat file:
//! ```bash
//! build_corpus --input middle_standards_simple.txt --level middle \
//!     --from-flat --output middle_standards.json
//! ```

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use standards_search::{
    corpus::CorpusBuilder,
    models::{SchoolLevel, StandardRecord},
    normalizer::LineScanner,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Corpus builder CLI for converting raw curriculum text to the JSON corpus
#[derive(Parser, Debug)]
#[command(
    name = "build_corpus",
    version,
    about = "Convert raw achievement-standard text into the JSON corpus",
    long_about = "Offline conversion pipeline: scan raw pasted curriculum text for grade/subject \
                  headers and bracketed standard lines, and write the nested JSON lookup used by \
                  the recommender.

EXAMPLES:
  Build an elementary corpus:
    build_corpus --input raw_standards.txt --level elementary --output achievement_standards.json

  Keep the intermediate flat file:
    build_corpus --input raw_standards.txt --level elementary --output out.json --flat-output out.txt

  Rebuild from a flat file:
    build_corpus --input middle_standards_simple.txt --level middle --from-flat --output middle_standards.json"
)]
struct Args {
    /// Input text file (raw pasted text, or flat records with --from-flat)
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// School level of the source text
    #[arg(long, value_name = "LEVEL")]
    level: SchoolLevel,

    /// Output JSON corpus path
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Also write the intermediate flat text format to this path
    #[arg(long, value_name = "FILE", conflicts_with = "from_flat")]
    flat_output: Option<PathBuf>,

    /// Treat the input as the intermediate flat format instead of raw text
    #[arg(long)]
    from_flat: bool,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Parse a flat-format file into records, skipping malformed lines with a warning.
fn records_from_flat(text: &str, level: SchoolLevel) -> Vec<StandardRecord> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match StandardRecord::parse_flat_line(line, level) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = %line, error = %e, "skipping malformed flat line"),
        }
    }
    records
}

fn write_flat_file(path: &PathBuf, records: &[StandardRecord]) -> Result<()> {
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create flat output file: {}", path.display()))?;
    for record in records {
        writeln!(file, "{}", record.to_flat_line())
            .with_context(|| format!("Failed to write flat output file: {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Starting corpus build");

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input file: {}", args.input.display()))?;

    // Collect records either by scanning raw text or parsing the flat format
    let mut scanner = LineScanner::new(args.level);
    let records = if args.from_flat {
        info!("Parsing flat records from {}", args.input.display());
        records_from_flat(&text, args.level)
    } else {
        info!("Scanning raw text from {}", args.input.display());
        scanner.scan(text.lines())
    };

    if records.is_empty() {
        warn!("No standard records found in input");
    }

    if let Some(flat_path) = &args.flat_output {
        write_flat_file(flat_path, &records)?;
        info!("Wrote flat records to {}", flat_path.display());
    }

    // Group records into the nested corpus and persist it
    let record_count = records.len();
    let mut builder = CorpusBuilder::new(args.level);
    builder.extend(records);
    let skipped = builder.skipped();
    let corpus = builder.finish();

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }
    }
    corpus
        .save(&args.output)
        .with_context(|| format!("Failed to write corpus to {}", args.output.display()))?;

    let stats = scanner.stats();
    println!("╔════════════════════════════════════════╗");
    println!("║      Corpus Build Completed            ║");
    println!("╠════════════════════════════════════════╣");
    if !args.from_flat {
        println!("║ Lines scanned:        {:>16} ║", stats.lines);
        println!("║ Headers matched:      {:>16} ║", stats.headers_matched);
        println!("║ Malformed headers:    {:>16} ║", stats.headers_malformed);
        println!("║ Orphans dropped:      {:>16} ║", stats.orphans_dropped);
    }
    println!("║ Records collected:    {:>16} ║", record_count);
    println!("║ Records skipped:      {:>16} ║", skipped);
    println!("║ Standards in corpus:  {:>16} ║", corpus.len());
    println!("╚════════════════════════════════════════╝");

    if stats.headers_malformed > 0 || stats.orphans_dropped > 0 {
        warn!(
            malformed_headers = stats.headers_malformed,
            orphans = stats.orphans_dropped,
            "some input lines were dropped - check warnings above"
        );
    }

    info!("Corpus written to {}", args.output.display());
    Ok(())
}
