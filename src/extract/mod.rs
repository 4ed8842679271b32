//! Public address extraction
//!
//! Walks normalized instance descriptors for public addresses, folds the
//! results per resource identifier, and writes the final mapping.

pub mod aggregate;
pub mod extractor;
pub mod writer;

pub use aggregate::{aggregate, aggregate_parallel, Aggregator};
pub use extractor::AddressExtractor;
pub use writer::AddressWriter;
