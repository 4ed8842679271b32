//! Document normalization - one lookup surface over every document shape
//!
//! Inventory records reach the extractor as JSON objects, BSON documents,
//! raw BSON bytes, or flattened `{Key, Value}` lists. This module coerces
//! each of them into a `DocumentView` and resolves semantically named fields
//! on it, case-insensitively and with an alias fallback.

pub mod node;
pub mod resolver;
pub mod view;

pub use node::Node;
pub use resolver::{fields, AliasTable, FieldResolver};
pub use view::{coerce_document, coerce_pair_list, coerce_sequence, DocumentView, Representation};
