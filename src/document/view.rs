//! Canonical document views and the representation coercer
//!
//! Every lookup in the crate goes through a `DocumentView`, whatever shape the
//! underlying document arrived in. Views borrow their input where they can;
//! only binary documents are decoded into owned storage.

use bson::spec::BinarySubtype;
use bson::{Bson, Document};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use super::node::Node;

/// The representation a view was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// Unordered key/value mapping (a JSON object)
    Mapping,
    /// Ordered key/value sequence (a BSON document)
    OrderedPairs,
    /// Binary-encoded BSON document, decoded on coercion
    Binary,
    /// A list of `{Key, Value}` records
    FlattenedPairList,
}

impl Representation {
    pub fn as_str(self) -> &'static str {
        match self {
            Representation::Mapping => "mapping",
            Representation::OrderedPairs => "ordered-pairs",
            Representation::Binary => "binary",
            Representation::FlattenedPairList => "flattened-pair-list",
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a key lives in the backing storage.
#[derive(Debug, Clone)]
struct Slot {
    key: String,
    position: usize,
}

#[derive(Debug, Clone)]
enum Fields<'a> {
    Json(&'a Map<String, Value>),
    Bson(Cow<'a, Document>),
    Pairs(Vec<(String, Option<Node<'a>>)>),
}

/// A document normalized for field lookup.
///
/// The lowercase index is built once, when the view is created. Keys that
/// differ only by case are kept side by side in byte order of the original
/// key (document position breaks ties), so case-insensitive lookups never
/// depend on the container's iteration order.
#[derive(Debug, Clone)]
pub struct DocumentView<'a> {
    representation: Representation,
    fields: Fields<'a>,
    index: BTreeMap<String, Vec<Slot>>,
}

impl<'a> DocumentView<'a> {
    fn new(representation: Representation, fields: Fields<'a>) -> Self {
        let index = match &fields {
            Fields::Json(map) => build_index(map.keys().map(String::as_str)),
            Fields::Bson(doc) => build_index(doc.keys().map(String::as_str)),
            Fields::Pairs(pairs) => build_index(pairs.iter().map(|(key, _)| key.as_str())),
        };

        DocumentView {
            representation,
            fields,
            index,
        }
    }

    /// Wrap a JSON object without copying it.
    pub fn mapping(map: &'a Map<String, Value>) -> Self {
        Self::new(Representation::Mapping, Fields::Json(map))
    }

    /// Wrap a BSON document, borrowed or owned.
    pub fn ordered(doc: Cow<'a, Document>) -> Self {
        Self::new(Representation::OrderedPairs, Fields::Bson(doc))
    }

    /// Build a view over already-split key/value pairs.
    pub fn from_pairs(pairs: Vec<(String, Option<Node<'a>>)>) -> Self {
        Self::new(Representation::FlattenedPairList, Fields::Pairs(pairs))
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Number of distinct keys in the view.
    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Original keys, grouped by their lowercase form.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.index
            .values()
            .flat_map(|slots| slots.iter().map(|slot| slot.key.as_str()))
    }

    /// Case-insensitive lookup.
    ///
    /// Among keys that collide once lowercased, an exact match for `name`
    /// wins, then the smallest original key.
    pub fn get_ignore_case(&self, name: &str) -> Option<Node<'a>> {
        let slots = self.index.get(&name.to_lowercase())?;
        let slot = slots
            .iter()
            .find(|slot| slot.key == name)
            .or_else(|| slots.first())?;
        self.value_at(slot)
    }

    /// Exact, case-sensitive lookup.
    pub fn get_exact(&self, key: &str) -> Option<Node<'a>> {
        let slot = self
            .index
            .get(&key.to_lowercase())?
            .iter()
            .find(|slot| slot.key == key)?;
        self.value_at(slot)
    }

    fn value_at(&self, slot: &Slot) -> Option<Node<'a>> {
        match &self.fields {
            Fields::Json(map) => {
                let map: &'a Map<String, Value> = *map;
                map.get(&slot.key).map(Node::Json)
            }
            Fields::Bson(Cow::Borrowed(doc)) => {
                let doc: &'a Document = *doc;
                doc.get(&slot.key).map(|value| Node::Bson(Cow::Borrowed(value)))
            }
            Fields::Bson(Cow::Owned(doc)) => doc
                .get(&slot.key)
                .map(|value| Node::Bson(Cow::Owned(value.clone()))),
            Fields::Pairs(pairs) => pairs
                .get(slot.position)
                .and_then(|(_, value)| value.clone()),
        }
    }
}

fn build_index<'k>(keys: impl Iterator<Item = &'k str>) -> BTreeMap<String, Vec<Slot>> {
    let mut index: BTreeMap<String, Vec<Slot>> = BTreeMap::new();
    for (position, key) in keys.enumerate() {
        index.entry(key.to_lowercase()).or_default().push(Slot {
            key: key.to_string(),
            position,
        });
    }
    for slots in index.values_mut() {
        slots.sort_by(|a, b| a.key.cmp(&b.key).then(a.position.cmp(&b.position)));
    }
    index
}

/// Coerce any node into a document view.
///
/// Returns `None` ("not coercible") for scalars, empty or irregular arrays,
/// and bytes that do not decode as a BSON document. Never panics.
pub fn coerce_document(node: Node<'_>) -> Option<DocumentView<'_>> {
    match node {
        Node::Json(Value::Object(map)) => Some(DocumentView::mapping(map)),
        Node::Json(Value::Array(items)) => coerce_pair_items(items.iter().map(Node::Json).collect()),
        Node::Json(_) => None,
        Node::Bson(Cow::Borrowed(value)) => coerce_borrowed_bson(value),
        Node::Bson(Cow::Owned(value)) => coerce_owned_bson(value),
        Node::Binary(bytes) => decode_binary(bytes),
    }
}

/// Coerce a node into a flattened pair-list view only.
pub fn coerce_pair_list(node: Node<'_>) -> Option<DocumentView<'_>> {
    coerce_sequence(node).and_then(coerce_pair_items)
}

/// Coerce a node into its elements. JSON arrays and BSON arrays are treated
/// the same way.
pub fn coerce_sequence(node: Node<'_>) -> Option<Vec<Node<'_>>> {
    match node {
        Node::Json(Value::Array(items)) => Some(items.iter().map(Node::Json).collect()),
        Node::Bson(Cow::Borrowed(Bson::Array(items))) => Some(
            items
                .iter()
                .map(|item| Node::Bson(Cow::Borrowed(item)))
                .collect(),
        ),
        Node::Bson(Cow::Owned(Bson::Array(items))) => Some(
            items
                .into_iter()
                .map(|item| Node::Bson(Cow::Owned(item)))
                .collect(),
        ),
        _ => None,
    }
}

fn coerce_borrowed_bson(value: &Bson) -> Option<DocumentView<'_>> {
    match value {
        Bson::Document(doc) => Some(DocumentView::ordered(Cow::Borrowed(doc))),
        Bson::Array(items) => coerce_pair_items(
            items
                .iter()
                .map(|item| Node::Bson(Cow::Borrowed(item)))
                .collect(),
        ),
        Bson::Binary(binary) if binary.subtype == BinarySubtype::Generic => {
            decode_binary(&binary.bytes)
        }
        _ => None,
    }
}

fn coerce_owned_bson<'a>(value: Bson) -> Option<DocumentView<'a>> {
    match value {
        Bson::Document(doc) => Some(DocumentView::ordered(Cow::Owned(doc))),
        Bson::Array(items) => coerce_pair_items(
            items
                .into_iter()
                .map(|item| Node::Bson(Cow::Owned(item)))
                .collect(),
        ),
        Bson::Binary(binary) if binary.subtype == BinarySubtype::Generic => {
            decode_binary(&binary.bytes)
        }
        _ => None,
    }
}

/// Decode a binary document in full. The most expensive path.
fn decode_binary<'a>(bytes: &[u8]) -> Option<DocumentView<'a>> {
    let mut reader = bytes;
    let doc = Document::from_reader(&mut reader).ok()?;
    Some(DocumentView::new(
        Representation::Binary,
        Fields::Bson(Cow::Owned(doc)),
    ))
}

/// Entries without a string `Key` are skipped; `Value` is optional. At least
/// one entry must carry a key, otherwise the array is not a pair list.
fn coerce_pair_items(items: Vec<Node<'_>>) -> Option<DocumentView<'_>> {
    let pairs: Vec<_> = items.into_iter().filter_map(pair_entry).collect();
    if pairs.is_empty() {
        return None;
    }
    Some(DocumentView::from_pairs(pairs))
}

fn pair_entry(item: Node<'_>) -> Option<(String, Option<Node<'_>>)> {
    let entry = coerce_document(item)?;
    let key = entry.get_ignore_case("key")?.as_str()?.to_string();
    Some((key, entry.get_ignore_case("value")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, Binary};
    use serde_json::json;

    fn encode(doc: &Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        doc.to_writer(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_mapping_is_wrapped_directly() {
        let value = json!({"PublicIpAddress": "1.2.3.4"});
        let view = coerce_document(Node::Json(&value)).unwrap();

        assert_eq!(view.representation(), Representation::Mapping);
        assert_eq!(
            view.get_ignore_case("publicipaddress").unwrap().as_str(),
            Some("1.2.3.4")
        );
    }

    #[test]
    fn test_bson_document_is_ordered_pairs() {
        let value = Bson::Document(doc! { "InstanceId": "i-1", "State": { "Name": "running" } });
        let view = coerce_document(Node::from(&value)).unwrap();

        assert_eq!(view.representation(), Representation::OrderedPairs);
        assert_eq!(view.len(), 2);
        assert_eq!(view.get_ignore_case("instanceid").unwrap().as_str(), Some("i-1"));
    }

    #[test]
    fn test_owned_bson_document_resolves() {
        let node = Node::Bson(Cow::Owned(Bson::Document(doc! { "publicIp": "9.9.9.9" })));
        let view = coerce_document(node).unwrap();
        assert_eq!(view.get_exact("publicIp").unwrap().as_str(), Some("9.9.9.9"));
    }

    #[test]
    fn test_binary_is_decoded() {
        let bytes = encode(&doc! { "PublicIpAddress": "1.2.3.4" });
        let view = coerce_document(Node::Binary(&bytes)).unwrap();

        assert_eq!(view.representation(), Representation::Binary);
        assert_eq!(
            view.get_ignore_case("publicIpAddress").unwrap().as_str(),
            Some("1.2.3.4")
        );
    }

    #[test]
    fn test_nested_generic_binary_is_decoded() {
        let inner = encode(&doc! { "publicIp": "5.6.7.8" });
        let value = Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: inner,
        });

        let view = coerce_document(Node::from(&value)).unwrap();
        assert_eq!(view.representation(), Representation::Binary);
        assert_eq!(view.get_ignore_case("PUBLICIP").unwrap().as_str(), Some("5.6.7.8"));
    }

    #[test]
    fn test_garbage_bytes_are_not_coercible() {
        assert!(coerce_document(Node::Binary(&[1, 2, 3])).is_none());

        let uuid = Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: vec![0; 16],
        });
        assert!(coerce_document(Node::from(&uuid)).is_none());
    }

    #[test]
    fn test_pair_list_with_mixed_key_case() {
        let value = json!([
            {"Key": "InstanceId", "Value": "i-7"},
            {"key": "PublicIpAddress", "value": "3.3.3.3"},
            {"KEY": "Tags"}
        ]);
        let view = coerce_document(Node::Json(&value)).unwrap();

        assert_eq!(view.representation(), Representation::FlattenedPairList);
        assert_eq!(view.get_ignore_case("instanceId").unwrap().as_str(), Some("i-7"));
        assert_eq!(
            view.get_ignore_case("publicipaddress").unwrap().as_str(),
            Some("3.3.3.3")
        );
        // Present key without a value resolves to nothing
        assert!(view.get_ignore_case("tags").is_none());
    }

    #[test]
    fn test_bson_pair_list() {
        let value = Bson::Array(vec![
            Bson::Document(doc! { "Key": "PublicIp", "Value": "8.8.8.8" }),
        ]);
        let view = coerce_pair_list(Node::from(&value)).unwrap();
        assert_eq!(view.get_ignore_case("publicip").unwrap().as_str(), Some("8.8.8.8"));
    }

    #[test]
    fn test_irregular_arrays_are_not_coercible() {
        let empty = json!([]);
        let scalars = json!(["a", "b"]);
        let plain_documents = json!([{"Name": "a"}, {"Name": "b"}]);
        let numeric_key = json!([{"Key": 1, "Value": 1}]);

        assert!(coerce_document(Node::Json(&empty)).is_none());
        assert!(coerce_document(Node::Json(&scalars)).is_none());
        assert!(coerce_document(Node::Json(&plain_documents)).is_none());
        assert!(coerce_document(Node::Json(&numeric_key)).is_none());
    }

    #[test]
    fn test_pair_list_skips_malformed_entries() {
        let value = json!([
            {"Key": "PublicIpAddress", "Value": "1.2.3.4"},
            {"Name": "stray-entry-without-key"},
            {"Key": 7, "Value": "numeric key"},
            "eni-123",
            {"Key": "InstanceId", "Value": "i-1"}
        ]);
        let view = coerce_document(Node::Json(&value)).unwrap();

        assert_eq!(view.representation(), Representation::FlattenedPairList);
        assert_eq!(view.len(), 2);
        assert_eq!(view.get_ignore_case("publicipaddress").unwrap().as_str(), Some("1.2.3.4"));
        assert_eq!(view.get_ignore_case("instanceid").unwrap().as_str(), Some("i-1"));
    }

    #[test]
    fn test_scalars_are_not_coercible() {
        let text = json!("1.2.3.4");
        assert!(coerce_document(Node::Json(&text)).is_none());
        assert!(coerce_document(Node::Bson(Cow::Owned(Bson::Int32(1)))).is_none());
        assert!(coerce_sequence(Node::Json(&text)).is_none());
    }

    #[test]
    fn test_sequences_treated_identically() {
        let json = json!([{"a": 1}, {"a": 2}]);
        let bson = Bson::Array(vec![Bson::Document(doc! {"a": 1}), Bson::Document(doc! {"a": 2})]);

        assert_eq!(coerce_sequence(Node::Json(&json)).unwrap().len(), 2);
        assert_eq!(coerce_sequence(Node::from(&bson)).unwrap().len(), 2);
        assert_eq!(
            coerce_sequence(Node::Bson(Cow::Owned(bson.clone()))).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_case_collision_prefers_exact_then_byte_order() {
        let value = json!({
            "publicipaddress": "lower",
            "PublicIpAddress": "camel",
            "PUBLICIPADDRESS": "upper"
        });
        let view = coerce_document(Node::Json(&value)).unwrap();

        assert_eq!(view.get_ignore_case("PublicIpAddress").unwrap().as_str(), Some("camel"));
        assert_eq!(view.get_ignore_case("publicipaddress").unwrap().as_str(), Some("lower"));
        // No exact match: smallest original key wins
        assert_eq!(view.get_ignore_case("publicIpAddress").unwrap().as_str(), Some("upper"));
    }

    #[test]
    fn test_pair_list_duplicates_keep_document_order() {
        let value = json!([
            {"Key": "Name", "Value": "first"},
            {"Key": "Name", "Value": "second"}
        ]);
        let view = coerce_document(Node::Json(&value)).unwrap();

        assert_eq!(view.len(), 2);
        assert_eq!(view.get_exact("Name").unwrap().as_str(), Some("first"));
    }

    #[test]
    fn test_get_exact_is_case_sensitive() {
        let value = json!({"PublicIp": "1.1.1.1"});
        let view = coerce_document(Node::Json(&value)).unwrap();

        assert!(view.get_exact("publicip").is_none());
        assert!(view.get_exact("PublicIp").is_some());
        assert_eq!(view.keys().collect::<Vec<_>>(), vec!["PublicIp"]);
    }
}
