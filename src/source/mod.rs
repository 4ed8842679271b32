//! Paged record sources
//!
//! A `RecordSource` hands out stored inventory records one page at a time,
//! sorted on a caller-chosen key and narrowed by a `RecordFilter`. The
//! harvester walks pages until the source stops returning a cursor.

pub mod harvest;

use bson::Bson;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use crate::document::{coerce_document, AliasTable, FieldResolver, Node};
use crate::errors::SourceError;
use crate::types::Payload;

pub use harvest::{HarvestStats, Harvester};

/// Narrows a source to records of one type.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    type_path: Vec<String>,
    type_pattern: Option<Regex>,
}

impl RecordFilter {
    pub fn new(type_path: Vec<String>, type_pattern: Option<Regex>) -> Self {
        RecordFilter {
            type_path,
            type_pattern,
        }
    }

    /// A filter that keeps everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Records pass when no pattern is set, or when the string at the type
    /// path matches it. Field names on the path are matched without case.
    pub fn matches(&self, stored: &Payload) -> bool {
        let Some(pattern) = &self.type_pattern else {
            return true;
        };
        let Some(view) = coerce_document(stored.node()) else {
            return false;
        };
        let aliases = AliasTable::new();
        FieldResolver::new(&aliases)
            .resolve_path(&view, &self.type_path)
            .is_some_and(|node| node.as_str().is_some_and(|kind| pattern.is_match(kind)))
    }
}

/// One page request.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub filter: RecordFilter,
    pub page_size: usize,
    /// Sort key as a path of field names
    pub sort_by: Vec<String>,
    pub sort_descending: bool,
    /// Opaque cursor from the previous page
    pub after_cursor: Option<String>,
}

impl PageQuery {
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after_cursor = Some(cursor.into());
        self
    }
}

/// Records of one page and the cursor for the next, if any.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Payload>,
    pub next_cursor: Option<String>,
}

/// The store that inventory records are read from.
pub trait RecordSource {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Number of stored records that pass `filter`.
    fn count(&self, filter: &RecordFilter) -> Result<u64, SourceError>;

    fn list_page(&self, query: &PageQuery) -> Result<Page, SourceError>;
}

/// Page through `source` until it stops returning a cursor.
pub fn fetch_all(source: &dyn RecordSource, query: PageQuery) -> Result<Vec<Payload>, SourceError> {
    let mut query = query;
    let mut records = Vec::new();
    loop {
        let page = source.list_page(&query)?;
        records.extend(page.records);
        match page.next_cursor {
            Some(cursor) if !cursor.is_empty() => query.after_cursor = Some(cursor),
            _ => break,
        }
    }
    Ok(records)
}

/// Sort position of a record. Missing keys sort lowest, then numbers, then
/// strings. NaN counts as missing so the order stays total.
#[derive(Debug, Clone)]
enum SortValue {
    Missing,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl SortValue {
    fn of(node: Option<Node<'_>>) -> Self {
        let Some(node) = node else {
            return SortValue::Missing;
        };
        if let Some(text) = node.as_str() {
            return SortValue::Text(text.to_string());
        }
        match node {
            Node::Json(Value::Number(n)) => match n.as_i64() {
                Some(n) => SortValue::Integer(n),
                None => n.as_f64().map_or(SortValue::Missing, SortValue::float),
            },
            Node::Bson(value) => match value.as_ref() {
                Bson::Int32(n) => SortValue::Integer(i64::from(*n)),
                Bson::Int64(n) => SortValue::Integer(*n),
                Bson::Double(n) => SortValue::float(*n),
                Bson::DateTime(at) => SortValue::Integer(at.timestamp_millis()),
                _ => SortValue::Missing,
            },
            _ => SortValue::Missing,
        }
    }

    fn float(n: f64) -> Self {
        if n.is_nan() {
            SortValue::Missing
        } else {
            SortValue::Float(n)
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortValue::Missing => 0,
            SortValue::Integer(_) | SortValue::Float(_) => 1,
            SortValue::Text(_) => 2,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Integer(a), SortValue::Integer(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (SortValue::Integer(a), SortValue::Float(b)) => compare_integer_float(*a, *b),
            (SortValue::Float(a), SortValue::Integer(b)) => compare_integer_float(*b, *a).reverse(),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Exact comparison of an integer with a non-NaN float.
fn compare_integer_float(int: i64, float: f64) -> Ordering {
    // 2^63, the first float above every i64
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if float >= BOUND {
        return Ordering::Less;
    }
    if float < -BOUND {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(float - whole)).unwrap_or(Ordering::Equal),
        order => order,
    }
}

/// What a computed page order depends on.
#[derive(Debug, Clone, PartialEq)]
struct OrderKey {
    type_path: Vec<String>,
    type_pattern: Option<String>,
    sort_by: Vec<String>,
    sort_descending: bool,
}

impl OrderKey {
    fn of(query: &PageQuery) -> Self {
        OrderKey {
            type_path: query.filter.type_path.clone(),
            type_pattern: query.filter.type_pattern.as_ref().map(|p| p.as_str().to_string()),
            sort_by: query.sort_by.clone(),
            sort_descending: query.sort_descending,
        }
    }
}

/// Record indices in page order for one `OrderKey`.
#[derive(Debug)]
struct CachedOrder {
    key: OrderKey,
    indices: Arc<Vec<usize>>,
}

/// Stored records held in memory, e.g. loaded from a JSON export.
///
/// The filtered, sorted order is computed on the first page of a query and
/// reused for the following pages; adding a record drops it.
#[derive(Debug, Default)]
pub struct MemorySource {
    name: String,
    records: Vec<Payload>,
    order: Mutex<Option<CachedOrder>>,
}

impl Clone for MemorySource {
    fn clone(&self) -> Self {
        MemorySource {
            name: self.name.clone(),
            records: self.records.clone(),
            order: Mutex::new(None),
        }
    }
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        MemorySource {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_records<I>(name: impl Into<String>, records: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Payload>,
    {
        MemorySource {
            name: name.into(),
            records: records.into_iter().map(Into::into).collect(),
            order: Mutex::new(None),
        }
    }

    pub fn push(&mut self, record: impl Into<Payload>) {
        self.records.push(record.into());
        let order = match self.order.get_mut() {
            Ok(order) => order,
            Err(poisoned) => poisoned.into_inner(),
        };
        *order = None;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Indices of the filtered records in page order, cached per query shape.
    fn ordered(&self, query: &PageQuery) -> Arc<Vec<usize>> {
        let key = OrderKey::of(query);
        let mut cached = match self.order.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(order) = cached.as_ref().filter(|order| order.key == key) {
            return Arc::clone(&order.indices);
        }

        let indices = Arc::new(self.sort_indices(query));
        *cached = Some(CachedOrder {
            key,
            indices: Arc::clone(&indices),
        });
        indices
    }

    /// The sort is stable, so equal keys keep insertion order.
    fn sort_indices(&self, query: &PageQuery) -> Vec<usize> {
        let aliases = AliasTable::new();
        let resolver = FieldResolver::new(&aliases);

        let mut keyed: Vec<(SortValue, usize)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| query.filter.matches(record))
            .map(|(position, record)| {
                let key = coerce_document(record.node())
                    .and_then(|view| resolver.resolve_path(&view, &query.sort_by))
                    .filter(|node| !node.is_null());
                (SortValue::of(key), position)
            })
            .collect();

        keyed.sort_by(|(a, _), (b, _)| {
            let order = a.compare(b);
            if query.sort_descending {
                order.reverse()
            } else {
                order
            }
        });
        keyed.into_iter().map(|(_, position)| position).collect()
    }
}

impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, filter: &RecordFilter) -> Result<u64, SourceError> {
        Ok(self.records.iter().filter(|record| filter.matches(record)).count() as u64)
    }

    fn list_page(&self, query: &PageQuery) -> Result<Page, SourceError> {
        if query.page_size == 0 {
            return Err(SourceError::InvalidQuery("page size must be at least 1".to_string()));
        }

        let offset = match query.after_cursor.as_deref() {
            None | Some("") => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| SourceError::InvalidCursor(cursor.to_string()))?,
        };

        let ordered = self.ordered(query);
        if offset > ordered.len() {
            return Err(SourceError::InvalidCursor(offset.to_string()));
        }

        let end = offset.saturating_add(query.page_size).min(ordered.len());
        let records = ordered[offset..end]
            .iter()
            .map(|&position| self.records[position].clone())
            .collect();
        let next_cursor = (end < ordered.len()).then(|| end.to_string());

        Ok(Page {
            records,
            next_cursor,
        })
    }
}
