use std::collections::BTreeSet;

use crate::document::{coerce_document, coerce_sequence, fields, AliasTable, DocumentView, FieldResolver, Node};
use crate::types::{Payload, ResourceRecord};

/// Collects public addresses from an instance descriptor.
///
/// The traversal is fixed: the top-level public address, then for every
/// network interface its association's public IP and the association public
/// IP of each of its private addresses. Structured documents and flattened
/// `{Key, Value}` lists go through the same walk, because a pair-list view
/// resolves fields by key lookup over its entries.
#[derive(Debug, Clone, Copy)]
pub struct AddressExtractor<'t> {
    resolver: FieldResolver<'t>,
}

impl<'t> AddressExtractor<'t> {
    pub fn new(aliases: &'t AliasTable) -> Self {
        AddressExtractor {
            resolver: FieldResolver::new(aliases),
        }
    }

    pub fn resolver(&self) -> &FieldResolver<'t> {
        &self.resolver
    }

    /// Every distinct, non-empty public address found in `payload`.
    pub fn extract_addresses(&self, payload: &Payload) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        if let Some(view) = coerce_document(payload.node()) {
            self.collect_from_view(&view, &mut found);
        }
        found
    }

    /// The `instanceId` embedded in `payload`.
    pub fn instance_id(&self, payload: &Payload) -> Option<String> {
        let view = coerce_document(payload.node())?;
        self.resolver.resolve_text(&view, &[fields::INSTANCE_ID])
    }

    /// Identifier and addresses for one record.
    ///
    /// Returns `None` when neither the record nor its payload carries an
    /// identifier. The address set may be empty.
    pub fn extract(&self, record: &ResourceRecord) -> Option<(String, BTreeSet<String>)> {
        let id = match record.record_id() {
            Some(id) => id.to_string(),
            None => self.instance_id(&record.payload)?,
        };
        Some((id, self.extract_addresses(&record.payload)))
    }

    fn collect_from_view(&self, view: &DocumentView<'_>, found: &mut BTreeSet<String>) {
        insert_address(self.resolver.resolve(view, fields::PUBLIC_IP_ADDRESS), found);

        let Some(interfaces) = self
            .resolver
            .resolve(view, fields::NETWORK_INTERFACES)
            .and_then(coerce_sequence)
        else {
            return;
        };

        for interface in interfaces {
            let Some(interface) = coerce_document(interface) else {
                continue;
            };
            self.collect_association(&interface, found);

            let private_addresses = self
                .resolver
                .resolve(&interface, fields::PRIVATE_IP_ADDRESSES)
                .and_then(coerce_sequence)
                .unwrap_or_default();

            for entry in private_addresses {
                if let Some(entry) = coerce_document(entry) {
                    self.collect_association(&entry, found);
                }
            }
        }
    }

    fn collect_association(&self, view: &DocumentView<'_>, found: &mut BTreeSet<String>) {
        let public_ip = self
            .resolver
            .resolve_path(view, &[fields::ASSOCIATION, fields::PUBLIC_IP]);
        insert_address(public_ip, found);
    }
}

fn insert_address(node: Option<Node<'_>>, found: &mut BTreeSet<String>) {
    if let Some(address) = node.as_ref().and_then(Node::non_empty_str) {
        found.insert(address.to_string());
    }
}
