use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use super::extractor::AddressExtractor;
use crate::types::{AddressMap, ResourceRecord};

/// Accumulates address sets per identifier.
///
/// Merging is commutative and associative, so records can be folded in any
/// order or in independent partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregator {
    buckets: BTreeMap<String, BTreeSet<String>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add addresses for `id`. Empty identifiers and empty addresses are
    /// ignored; a bucket is only created once it has an address.
    pub fn insert<I>(&mut self, id: &str, addresses: I)
    where
        I: IntoIterator<Item = String>,
    {
        if id.is_empty() {
            return;
        }
        let mut addresses = addresses.into_iter().filter(|a| !a.is_empty()).peekable();
        if addresses.peek().is_none() {
            return;
        }
        self.buckets.entry(id.to_string()).or_default().extend(addresses);
    }

    /// Run `extractor` on one record and keep whatever it finds.
    ///
    /// Returns whether the record contributed any address.
    pub fn add_record(&mut self, extractor: &AddressExtractor<'_>, record: &ResourceRecord) -> bool {
        match extractor.extract(record) {
            Some((id, addresses)) if !addresses.is_empty() => {
                self.insert(&id, addresses);
                true
            }
            _ => false,
        }
    }

    pub fn merge(&mut self, other: Aggregator) {
        for (id, addresses) in other.buckets {
            self.buckets.entry(id).or_default().extend(addresses);
        }
    }

    fn merged(mut self, other: Aggregator) -> Aggregator {
        if self.buckets.len() < other.buckets.len() {
            let mut other = other;
            other.merge(self);
            return other;
        }
        self.merge(other);
        self
    }

    /// Number of identifiers with at least one address
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Sorted, duplicate-free address lists keyed by identifier.
    pub fn finish(self) -> AddressMap {
        self.buckets
            .into_iter()
            .map(|(id, addresses)| (id, addresses.into_iter().collect()))
            .collect()
    }
}

/// Extract and aggregate a batch of records.
pub fn aggregate<'r, I>(extractor: &AddressExtractor<'_>, records: I) -> AddressMap
where
    I: IntoIterator<Item = &'r ResourceRecord>,
{
    let mut aggregator = Aggregator::new();
    for record in records {
        aggregator.add_record(extractor, record);
    }
    aggregator.finish()
}

/// Like `aggregate`, but folds partitions of `records` on the rayon pool and
/// merges the partial results.
pub fn aggregate_parallel(extractor: &AddressExtractor<'_>, records: &[ResourceRecord]) -> AddressMap {
    fold_parallel(extractor, records).0.finish()
}

/// Parallel fold; also returns how many records contributed an address.
pub(crate) fn fold_parallel(
    extractor: &AddressExtractor<'_>,
    records: &[ResourceRecord],
) -> (Aggregator, usize) {
    records
        .par_iter()
        .fold(
            || (Aggregator::new(), 0),
            |(mut partial, contributing), record| {
                let added = partial.add_record(extractor, record);
                (partial, contributing + usize::from(added))
            },
        )
        .reduce(
            || (Aggregator::new(), 0),
            |(a, x), (b, y)| (a.merged(b), x + y),
        )
}
