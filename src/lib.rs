//! # ipsieve - Public address extraction from cloud inventory records
//!
//! Inventory exports describe the same virtual machine in many shapes: JSON
//! objects, BSON documents, raw BSON bytes, or flattened `{Key, Value}` lists,
//! with field names in whatever case the producing SDK preferred. This crate
//! normalizes all of them and extracts, per resource, the set of public
//! network addresses.
//!
//! ## Modules
//!
//! - **document**: representation coercion and alias-aware field resolution
//! - **extract**: public address traversal, aggregation and output
//! - **source**: paged record sources and the harvester that drives them
//!
//! ## Quick Start
//!
//! ```rust
//! use ipsieve::{aggregate, AddressExtractor, AliasTable, ResourceRecord};
//! use serde_json::json;
//!
//! let aliases = AliasTable::cloud_defaults();
//! let extractor = AddressExtractor::new(&aliases);
//!
//! let records = vec![ResourceRecord::new(
//!     "i-1",
//!     json!({
//!         "publicipaddress": "1.2.3.4",
//!         "networkinterfaces": [{"association": {"publicip": "5.6.7.8"}}]
//!     }),
//! )];
//!
//! let addresses = aggregate(&extractor, &records);
//! assert_eq!(addresses["i-1"], vec!["1.2.3.4", "5.6.7.8"]);
//! ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::BufRead;
use tracing::warn;

pub mod document;
pub mod errors;
pub mod extract;
pub mod source;
pub mod types;

// Re-export commonly used types for convenience
pub use document::{AliasTable, DocumentView, FieldResolver, Node, Representation};
pub use errors::{ConfigError, RecordError, SourceError};
pub use extract::{aggregate, aggregate_parallel, AddressExtractor, AddressWriter, Aggregator};
pub use source::{HarvestStats, Harvester, MemorySource, PageQuery, RecordFilter, RecordSource};
pub use types::{AddressMap, HarvestConfig, Payload, RecordLayout, ResourceRecord};

/// Read newline-delimited JSON records into a `MemorySource`.
///
/// Lines that are blank are ignored; lines that fail to parse are logged and
/// skipped.
pub fn read_ndjson<R: BufRead>(name: &str, reader: R) -> Result<MemorySource> {
    let mut source = MemorySource::new(name);

    for (number, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => source.push(value),
            Err(err) => warn!(source = name, line = number + 1, error = %err, "skipping unparseable record"),
        }
    }

    Ok(source)
}

/// Main entry point: harvest public addresses from an NDJSON record stream
pub fn harvest_json<R: BufRead>(reader: R, config: &HarvestConfig) -> Result<AddressMap> {
    let source = read_ndjson("input", reader)?;
    let harvester = Harvester::new(config).context("Invalid harvest config")?;
    harvester
        .harvest(&source)
        .context("Failed to harvest records")
}
