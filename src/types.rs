use bson::{Bson, Document};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::document::{coerce_document, AliasTable, FieldResolver, Node};
use crate::errors::{ConfigError, RecordError};
use crate::source::{PageQuery, RecordFilter};

/// Identifier -> sorted, duplicate-free public addresses
pub type AddressMap = BTreeMap<String, Vec<String>>;

/// An owned document in one of the accepted representations.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// JSON object (mapping) or JSON `{Key, Value}` list
    Json(Value),
    /// BSON document (ordered pairs) or BSON `{Key, Value}` list
    Bson(Bson),
    /// Binary-encoded BSON document
    Binary(Vec<u8>),
}

impl Payload {
    pub fn node(&self) -> Node<'_> {
        match self {
            Payload::Json(value) => Node::Json(value),
            Payload::Bson(value) => Node::from(value),
            Payload::Binary(bytes) => Node::Binary(bytes),
        }
    }

    /// Best-effort re-encoding of a typed record through BSON bytes.
    ///
    /// Returns `None` when the value does not serialize to a BSON document.
    pub fn from_serializable<T: Serialize>(value: &T) -> Option<Payload> {
        let doc = bson::to_document(value).ok()?;
        Self::encode(&doc)
    }

    /// Encode a BSON document into its binary form.
    pub fn encode(doc: &Document) -> Option<Payload> {
        let mut bytes = Vec::new();
        doc.to_writer(&mut bytes).ok()?;
        Some(Payload::Binary(bytes))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Bson> for Payload {
    fn from(value: Bson) -> Self {
        Payload::Bson(value)
    }
}

impl From<Document> for Payload {
    fn from(doc: Document) -> Self {
        Payload::Bson(Bson::Document(doc))
    }
}

/// A resource identifier paired with its descriptive payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Record-level identifier; wins over an `instanceId` inside the payload
    pub id: Option<String>,
    pub payload: Payload,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>, payload: impl Into<Payload>) -> Self {
        ResourceRecord {
            id: Some(id.into()),
            payload: payload.into(),
        }
    }

    /// A record whose identity has to come from the payload.
    pub fn anonymous(payload: impl Into<Payload>) -> Self {
        ResourceRecord {
            id: None,
            payload: payload.into(),
        }
    }

    /// Split a stored record into identifier and payload according to
    /// `layout`. An empty identifier is treated as missing.
    pub fn decode(
        stored: &Payload,
        layout: &RecordLayout,
        resolver: &FieldResolver<'_>,
    ) -> Result<Self, RecordError> {
        let view = coerce_document(stored.node()).ok_or(RecordError::NotADocument)?;

        let id = resolver.resolve_text(&view, &layout.id_path);
        let payload = resolver
            .resolve_path(&view, &layout.payload_path)
            .filter(|node| !node.is_null())
            .ok_or_else(|| RecordError::MissingPayload(layout.payload_path.join(".")))?
            .into_payload();

        Ok(ResourceRecord { id, payload })
    }

    /// The record-level identifier, if present and non-empty.
    pub fn record_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Where identifier, payload and record type live inside a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordLayout {
    pub id_path: Vec<String>,
    pub payload_path: Vec<String>,
    pub type_path: Vec<String>,
}

impl Default for RecordLayout {
    fn default() -> Self {
        RecordLayout {
            id_path: vec!["info".to_string(), "id".to_string()],
            payload_path: vec!["payload".to_string()],
            type_path: vec!["info".to_string(), "type".to_string()],
        }
    }
}

/// Parse a dotted path such as `info.id`.
pub fn parse_path(dotted: &str) -> Vec<String> {
    dotted
        .split('.')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Configuration for a harvest run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Records requested per page
    pub page_size: usize,

    /// Sort key, as a dotted path
    pub sort_by: String,

    /// Newest first when sorting on a creation timestamp
    pub sort_descending: bool,

    /// Regex the record type must match; `None` keeps every record
    pub type_pattern: Option<String>,

    pub layout: RecordLayout,

    /// Replaces the built-in alias table when given in a config file
    pub aliases: AliasTable,

    /// Fold records of each page across the rayon pool
    pub parallel: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        HarvestConfig {
            page_size: 100,
            sort_by: String::from("createdAt"),
            sort_descending: true,
            type_pattern: Some(String::from("(?i)^aws-instanceid$")),
            layout: RecordLayout::default(),
            aliases: AliasTable::cloud_defaults(),
            parallel: false,
        }
    }
}

impl HarvestConfig {
    /// Load a config from a JSON file; omitted fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: HarvestConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".to_string()));
        }
        if self.layout.payload_path.is_empty() {
            return Err(ConfigError::Invalid("layout.payload_path is empty".to_string()));
        }
        self.type_regex().map(|_| ())
    }

    fn type_regex(&self) -> Result<Option<Regex>, ConfigError> {
        self.type_pattern
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()
    }

    pub fn record_filter(&self) -> Result<RecordFilter, ConfigError> {
        Ok(RecordFilter::new(self.layout.type_path.clone(), self.type_regex()?))
    }

    /// The first-page query for this config.
    pub fn page_query(&self) -> Result<PageQuery, ConfigError> {
        self.validate()?;
        Ok(PageQuery {
            filter: self.record_filter()?,
            page_size: self.page_size,
            sort_by: parse_path(&self.sort_by),
            sort_descending: self.sort_descending,
            after_cursor: None,
        })
    }
}
