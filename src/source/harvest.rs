//! Harvesting addresses from record sources
//!
//! The harvester pages through a source, decodes each stored record into a
//! `ResourceRecord`, and folds the extracted addresses into an `Aggregator`.
//! A record that cannot be decoded is logged and skipped; only a failing
//! source aborts the run.

use tracing::{debug, info, warn};

use super::{PageQuery, RecordSource};
use crate::document::FieldResolver;
use crate::errors::{ConfigError, RecordError, SourceError};
use crate::extract::aggregate::fold_parallel;
use crate::extract::{AddressExtractor, Aggregator};
use crate::types::{AddressMap, HarvestConfig, Payload, ResourceRecord};

/// Counters for one harvest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub pages: usize,
    pub scanned: usize,
    /// Records dropped because they could not be decoded
    pub skipped: usize,
    /// Records that added at least one address
    pub contributing: usize,
}

impl HarvestStats {
    fn absorb(&mut self, other: HarvestStats) {
        self.pages += other.pages;
        self.scanned += other.scanned;
        self.skipped += other.skipped;
        self.contributing += other.contributing;
    }
}

pub struct Harvester<'c> {
    config: &'c HarvestConfig,
    query: PageQuery,
    extractor: AddressExtractor<'c>,
}

impl<'c> Harvester<'c> {
    pub fn new(config: &'c HarvestConfig) -> Result<Self, ConfigError> {
        Ok(Harvester {
            config,
            query: config.page_query()?,
            extractor: AddressExtractor::new(&config.aliases),
        })
    }

    /// Harvest one source into a fresh mapping.
    pub fn harvest(&self, source: &dyn RecordSource) -> Result<AddressMap, SourceError> {
        let mut aggregator = Aggregator::new();
        self.harvest_into(source, &mut aggregator)?;
        Ok(aggregator.finish())
    }

    /// Harvest several sources into one mapping. The first failing source
    /// fails the whole run.
    pub fn harvest_all(&self, sources: &[&dyn RecordSource]) -> Result<AddressMap, SourceError> {
        let mut aggregator = Aggregator::new();
        for source in sources {
            self.harvest_into(*source, &mut aggregator)?;
        }
        Ok(aggregator.finish())
    }

    /// Page through `source` and fold every record into `aggregator`.
    pub fn harvest_into(
        &self,
        source: &dyn RecordSource,
        aggregator: &mut Aggregator,
    ) -> Result<HarvestStats, SourceError> {
        let total = source.count(&self.query.filter)?;
        info!(source = source.name(), total, "harvesting records");

        let mut stats = HarvestStats::default();
        let mut query = self.query.clone();
        loop {
            let page = source.list_page(&query)?;
            stats.pages += 1;

            let records = self.decode_page(source.name(), &page.records, &mut stats);
            stats.absorb(self.fold_records(&records, aggregator));

            match page.next_cursor {
                Some(cursor) if !cursor.is_empty() => query.after_cursor = Some(cursor),
                _ => break,
            }
        }

        info!(
            source = source.name(),
            pages = stats.pages,
            scanned = stats.scanned,
            skipped = stats.skipped,
            contributing = stats.contributing,
            "harvest finished"
        );
        Ok(stats)
    }

    fn decode_page(
        &self,
        source_name: &str,
        stored: &[Payload],
        stats: &mut HarvestStats,
    ) -> Vec<ResourceRecord> {
        let resolver = FieldResolver::new(&self.config.aliases);
        let mut records = Vec::with_capacity(stored.len());

        for raw in stored {
            stats.scanned += 1;
            match ResourceRecord::decode(raw, &self.config.layout, &resolver) {
                Ok(record) => records.push(record),
                Err(err @ RecordError::MissingPayload(_)) => {
                    stats.skipped += 1;
                    debug!(source = source_name, error = %err, "skipping record");
                }
                Err(err) => {
                    stats.skipped += 1;
                    warn!(source = source_name, error = %err, "skipping malformed record");
                }
            }
        }
        records
    }

    fn fold_records(&self, records: &[ResourceRecord], aggregator: &mut Aggregator) -> HarvestStats {
        let mut stats = HarvestStats::default();

        if self.config.parallel {
            let (partial, contributing) = fold_parallel(&self.extractor, records);
            aggregator.merge(partial);
            stats.contributing = contributing;
            return stats;
        }

        for record in records {
            if aggregator.add_record(&self.extractor, record) {
                stats.contributing += 1;
            } else {
                debug!(id = record.record_id(), "record has no identifier or addresses");
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, Page, RecordFilter};
    use bson::doc;
    use serde_json::json;

    fn stored(id: &str, kind: &str, created_at: i64, payload: serde_json::Value) -> serde_json::Value {
        json!({
            "info": {"id": id, "type": kind},
            "createdAt": created_at,
            "payload": payload
        })
    }

    struct FailingSource;

    impl RecordSource for FailingSource {
        fn name(&self) -> &str {
            "xid_info"
        }

        fn count(&self, _filter: &RecordFilter) -> Result<u64, SourceError> {
            Ok(1)
        }

        fn list_page(&self, _query: &PageQuery) -> Result<Page, SourceError> {
            Err(SourceError::Unavailable {
                source_name: self.name().to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn test_harvest_across_pages() {
        let mut config = HarvestConfig::default();
        config.page_size = 2;

        let source = MemorySource::with_records(
            "aws_info",
            vec![
                stored("i-1", "aws-instanceid", 1, json!({"PublicIpAddress": "1.2.3.4"})),
                stored("i-2", "aws-instanceID", 2, json!({"publicipaddress": "2.2.2.2"})),
                stored("i-1", "aws-instanceid", 3, json!({
                    "NetworkInterfaces": [{"Association": {"PublicIp": "5.6.7.8"}}]
                })),
                stored("vpc-1", "aws-vpc", 4, json!({"PublicIpAddress": "3.3.3.3"})),
                stored("i-3", "aws-instanceid", 5, json!({"State": "stopped"})),
            ],
        );

        let harvester = Harvester::new(&config).unwrap();
        let mut aggregator = Aggregator::new();
        let stats = harvester.harvest_into(&source, &mut aggregator).unwrap();

        assert_eq!(stats.pages, 2);
        assert_eq!(stats.scanned, 4);
        assert_eq!(stats.contributing, 3);

        let output = aggregator.finish();
        let expected: AddressMap = serde_json::from_value(json!({
            "i-1": ["1.2.3.4", "5.6.7.8"],
            "i-2": ["2.2.2.2"]
        }))
        .unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_malformed_and_anonymous_records() {
        let mut config = HarvestConfig::default();
        config.type_pattern = None;

        let mut source = MemorySource::new("aws_info");
        source.push(json!("garbage"));
        source.push(json!({"info": {"id": "i-1"}}));
        source.push(Payload::Binary(vec![0, 1, 2]));
        source.push(doc! { "info": { "id": "" }, "payload": { "InstanceId": "i-embedded", "PublicIpAddress": "4.4.4.4" } });

        let harvester = Harvester::new(&config).unwrap();
        let mut aggregator = Aggregator::new();
        let stats = harvester.harvest_into(&source, &mut aggregator).unwrap();

        assert_eq!(stats.scanned, 4);
        assert_eq!(stats.skipped, 3);
        assert_eq!(aggregator.finish()["i-embedded"], vec!["4.4.4.4"]);
    }

    #[test]
    fn test_source_failure_is_an_error() {
        let config = HarvestConfig::default();
        let harvester = Harvester::new(&config).unwrap();

        let healthy = MemorySource::new("aws_info");
        assert!(harvester.harvest(&healthy).unwrap().is_empty());

        let result = harvester.harvest_all(&[&healthy, &FailingSource]);
        assert!(matches!(result, Err(SourceError::Unavailable { .. })));
    }

    #[test]
    fn test_parallel_config_matches_sequential() {
        let records: Vec<serde_json::Value> = (0..50)
            .map(|n| {
                stored(
                    &format!("i-{}", n % 6),
                    "aws-instanceid",
                    n,
                    json!({"PublicIpAddress": format!("52.1.1.{}", n % 9)}),
                )
            })
            .collect();
        let source = MemorySource::with_records("aws_info", records);

        let mut config = HarvestConfig::default();
        config.page_size = 7;
        let sequential = Harvester::new(&config).unwrap().harvest(&source).unwrap();

        config.parallel = true;
        let parallel = Harvester::new(&config).unwrap().harvest(&source).unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(sequential.len(), 6);
    }
}
