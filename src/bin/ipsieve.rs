//! ipsieve: Map cloud resource identifiers to their public addresses
//!
//! Reads exported inventory records (a JSON array, a single record, or
//! NDJSON) and prints a JSON object of identifier -> sorted addresses.
//!
//! Usage:
//!   # Read from file, output to stdout
//!   ipsieve aws_info.json
//!
//!   # Several exports are merged into one mapping
//!   ipsieve aws_info.json xid_info.jsonl
//!
//!   # Read from stdin, keep every record type, compact output
//!   cat dump.jsonl | ipsieve --any-type --compact

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use ipsieve::types::parse_path;
use ipsieve::{
    read_ndjson, AddressWriter, AliasTable, Aggregator, HarvestConfig, Harvester, MemorySource,
    RecordSource,
};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ipsieve")]
#[command(about = "Extract public addresses from cloud inventory records", long_about = None)]
struct Args {
    /// Input files, one record source each (use stdin if omitted)
    #[arg(value_name = "FILE")]
    inputs: Vec<String>,

    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<String>,

    /// JSON file of extra field spellings: {"publicIp": ["ip_public"]}
    #[arg(long)]
    aliases: Option<String>,

    /// Records per page (default: 100)
    #[arg(long)]
    page_size: Option<usize>,

    /// Dotted sort key (default: createdAt)
    #[arg(long)]
    sort_by: Option<String>,

    /// Oldest records first
    #[arg(long)]
    ascending: bool,

    /// Regex the record type must match (default: (?i)^aws-instanceid$)
    #[arg(long, conflicts_with = "any_type")]
    type_pattern: Option<String>,

    /// Keep records of every type
    #[arg(long)]
    any_type: bool,

    /// Dotted path of the record identifier (default: info.id)
    #[arg(long)]
    id_path: Option<String>,

    /// Dotted path of the record payload (default: payload)
    #[arg(long)]
    payload_path: Option<String>,

    /// Fold each page on the rayon thread pool
    #[arg(long)]
    parallel: bool,

    /// Compact output (no pretty-printing)
    #[arg(long)]
    compact: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries only the mapping
    let default_filter = if args.verbose { "ipsieve=debug" } else { "ipsieve=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = build_config(&args)?;
    let harvester = Harvester::new(&config).context("Invalid configuration")?;

    let sources = if args.inputs.is_empty() {
        vec![load_source("stdin", Box::new(std::io::stdin()))?]
    } else {
        args.inputs
            .iter()
            .map(|path| {
                let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
                load_source(path, Box::new(BufReader::new(file)))
            })
            .collect::<Result<Vec<_>>>()?
    };

    let mut aggregator = Aggregator::new();
    for source in &sources {
        harvester
            .harvest_into(source, &mut aggregator)
            .with_context(|| format!("Failed to harvest {}", source.name()))?;
    }

    let mut writer = if args.compact {
        AddressWriter::compact(std::io::stdout())
    } else {
        AddressWriter::new(std::io::stdout())
    };
    writer.write_map(&aggregator.finish())?;
    writer.flush()?;

    Ok(())
}

fn build_config(args: &Args) -> Result<HarvestConfig> {
    let mut config = match &args.config {
        Some(path) => HarvestConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path))?,
        None => HarvestConfig::default(),
    };

    if let Some(path) = &args.aliases {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read aliases {}", path))?;
        let extra: AliasTable = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse aliases {}", path))?;
        config.aliases.merge(extra);
    }
    if let Some(size) = args.page_size {
        config.page_size = size;
    }
    if let Some(sort_by) = &args.sort_by {
        config.sort_by = sort_by.clone();
    }
    if args.ascending {
        config.sort_descending = false;
    }
    if args.any_type {
        config.type_pattern = None;
    } else if let Some(pattern) = &args.type_pattern {
        config.type_pattern = Some(pattern.clone());
    }
    if let Some(path) = &args.id_path {
        config.layout.id_path = parse_path(path);
    }
    if let Some(path) = &args.payload_path {
        config.layout.payload_path = parse_path(path);
    }
    if args.parallel {
        config.parallel = true;
    }

    config.validate()?;
    Ok(config)
}

/// Load every record from `reader` using SIMD-accelerated JSON parsing when
/// possible, falling back to NDJSON.
fn load_source(name: &str, reader: Box<dyn Read>) -> Result<MemorySource> {
    let mut content = Vec::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader
        .read_to_end(&mut content)
        .with_context(|| format!("Failed to read {}", name))?;

    // simd-json parses in place, so keep the original bytes for the fallback
    let mut scratch = content.clone();
    match simd_json::to_owned_value(&mut scratch) {
        Ok(simd_json::OwnedValue::Array(arr)) => {
            let mut source = MemorySource::new(name);
            for elem in arr.iter() {
                // Convert simd_json value to serde_json::Value
                let json_str = simd_json::to_string(elem)?;
                let value: Value = serde_json::from_str(&json_str)?;
                source.push(value);
            }
            Ok(source)
        }
        Ok(elem) => {
            // Single record
            let json_str = simd_json::to_string(&elem)?;
            let value: Value = serde_json::from_str(&json_str)?;
            Ok(MemorySource::with_records(name, [value]))
        }
        Err(_) => read_ndjson(name, Cursor::new(content)),
    }
}
