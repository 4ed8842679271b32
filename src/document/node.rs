use bson::Bson;
use serde_json::Value;
use std::borrow::Cow;

use crate::types::Payload;

/// A single value taken from any supported document representation.
///
/// JSON and raw bytes are always borrowed. BSON values are borrowed when the
/// owning document outlives the lookup, and owned when they come out of a
/// document that was decoded on the fly.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<'a> {
    Json(&'a Value),
    Bson(Cow<'a, Bson>),
    /// Raw BSON document bytes
    Binary(&'a [u8]),
}

impl<'a> Node<'a> {
    /// The string contents of this node, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Json(Value::String(s)) => Some(s),
            Node::Bson(value) => match value.as_ref() {
                Bson::String(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Like `as_str`, but treats the empty string as absent.
    pub fn non_empty_str(&self) -> Option<&str> {
        self.as_str().filter(|s| !s.is_empty())
    }

    pub fn is_null(&self) -> bool {
        match self {
            Node::Json(value) => value.is_null(),
            Node::Bson(value) => matches!(value.as_ref(), Bson::Null | Bson::Undefined),
            Node::Binary(_) => false,
        }
    }

    /// Detach this node from the document it was read from.
    pub fn into_payload(self) -> Payload {
        match self {
            Node::Json(value) => Payload::Json(value.clone()),
            Node::Bson(value) => Payload::Bson(value.into_owned()),
            Node::Binary(bytes) => Payload::Binary(bytes.to_vec()),
        }
    }
}

impl<'a> From<&'a Value> for Node<'a> {
    fn from(value: &'a Value) -> Self {
        Node::Json(value)
    }
}

impl<'a> From<&'a Bson> for Node<'a> {
    fn from(value: &'a Bson) -> Self {
        Node::Bson(Cow::Borrowed(value))
    }
}
