//! Alias-aware field resolution over `DocumentView`s

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::node::Node;
use super::view::{coerce_document, coerce_pair_list, DocumentView};

/// Semantic field names the extractor asks for.
pub mod fields {
    pub const INSTANCE_ID: &str = "instanceId";
    pub const PUBLIC_IP_ADDRESS: &str = "publicIpAddress";
    pub const NETWORK_INTERFACES: &str = "networkInterfaces";
    pub const ASSOCIATION: &str = "association";
    pub const PRIVATE_IP_ADDRESSES: &str = "privateIpAddresses";
    pub const PUBLIC_IP: &str = "publicIp";
}

static CLOUD_DEFAULTS: Lazy<AliasTable> = Lazy::new(|| {
    AliasTable::new()
        .with_aliases(fields::INSTANCE_ID, ["InstanceId", "instance_id", "InstanceID"])
        .with_aliases(
            fields::PUBLIC_IP_ADDRESS,
            ["PublicIpAddress", "public_ip_address", "PublicIPAddress"],
        )
        .with_aliases(
            fields::NETWORK_INTERFACES,
            ["NetworkInterfaces", "network_interfaces"],
        )
        .with_aliases(fields::ASSOCIATION, ["Association"])
        .with_aliases(
            fields::PRIVATE_IP_ADDRESSES,
            ["PrivateIpAddresses", "private_ip_addresses"],
        )
        .with_aliases(fields::PUBLIC_IP, ["PublicIp", "public_ip", "PublicIP"])
});

/// Semantic field name -> literal spellings that are checked exactly.
///
/// Aliases are a fallback: they are consulted only after the
/// case-insensitive scan of a document's own keys comes up empty. Field
/// names are matched without regard to case; alias spellings are not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<String>>", into = "BTreeMap<String, Vec<String>>")]
pub struct AliasTable {
    aliases: BTreeMap<String, Vec<String>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The spellings used by the common cloud SDKs and inventory exports.
    pub fn cloud_defaults() -> Self {
        CLOUD_DEFAULTS.clone()
    }

    pub fn with_aliases<I, S>(mut self, field: &str, spellings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for spelling in spellings {
            self.insert(field, spelling);
        }
        self
    }

    /// Register one spelling for `field`. Duplicates are ignored.
    pub fn insert(&mut self, field: &str, spelling: impl Into<String>) {
        let spelling = spelling.into();
        if spelling.is_empty() {
            return;
        }
        let entry = self.aliases.entry(field.to_lowercase()).or_default();
        if !entry.contains(&spelling) {
            entry.push(spelling);
        }
    }

    /// Add every spelling from `other`, keeping existing ones first.
    pub fn merge(&mut self, other: AliasTable) {
        for (field, spellings) in other.aliases {
            for spelling in spellings {
                self.insert(&field, spelling);
            }
        }
    }

    pub fn aliases(&self, field: &str) -> &[String] {
        self.aliases
            .get(&field.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl From<BTreeMap<String, Vec<String>>> for AliasTable {
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        let mut table = AliasTable::new();
        for (field, spellings) in raw {
            for spelling in spellings {
                table.insert(&field, spelling);
            }
        }
        table
    }
}

impl From<AliasTable> for BTreeMap<String, Vec<String>> {
    fn from(table: AliasTable) -> Self {
        table.aliases
    }
}

/// Looks fields up by semantic name.
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'t> {
    aliases: &'t AliasTable,
}

impl<'t> FieldResolver<'t> {
    pub fn new(aliases: &'t AliasTable) -> Self {
        FieldResolver { aliases }
    }

    pub fn aliases(&self) -> &'t AliasTable {
        self.aliases
    }

    /// Resolve `field` in `view`: case-insensitive scan first, then each
    /// alias as an exact key.
    pub fn resolve<'a>(&self, view: &DocumentView<'a>, field: &str) -> Option<Node<'a>> {
        view.get_ignore_case(field).or_else(|| {
            self.aliases
                .aliases(field)
                .iter()
                .find_map(|alias| view.get_exact(alias))
        })
    }

    /// Walk `path` one field at a time, coercing every intermediate value into
    /// a view. Any missing or non-document step makes the whole path absent.
    pub fn resolve_path<'a, S: AsRef<str>>(
        &self,
        view: &DocumentView<'a>,
        path: &[S],
    ) -> Option<Node<'a>> {
        let (first, rest) = path.split_first()?;
        let mut current = self.resolve(view, first.as_ref())?;
        for field in rest {
            let next = coerce_document(current)?;
            current = self.resolve(&next, field.as_ref())?;
        }
        Some(current)
    }

    /// `resolve_path` narrowed to non-empty strings.
    pub fn resolve_text<S: AsRef<str>>(&self, view: &DocumentView<'_>, path: &[S]) -> Option<String> {
        self.resolve_path(view, path)
            .and_then(|node| node.non_empty_str().map(str::to_string))
    }

    /// Find `key` in a flattened `{Key, Value}` list and return its value.
    ///
    /// Only pair lists qualify; a plain mapping passed here is not searched.
    pub fn kv_find<'a>(&self, list: Node<'a>, key: &str) -> Option<Node<'a>> {
        let view = coerce_pair_list(list)?;
        self.resolve(&view, key)
    }
}
