//! Node identifier resolution for link endpoints.

use std::collections::HashMap;

use crate::{Error, Result};

/// Maps topology keys and display names to control-plane node ids.
///
/// Built once per provisioning run. Lookups try declared keys first, then
/// display names. A display name shared by two different nodes is kept as
/// ambiguous and resolving it is an error rather than a silent last-wins.
#[derive(Debug, Default)]
pub struct ResolutionTable {
    by_key: HashMap<String, String>,
    by_name: HashMap<String, NameEntry>,
}

#[derive(Debug)]
enum NameEntry {
    Unique(String),
    Ambiguous,
}

impl ResolutionTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a created node under its key and display name.
    ///
    /// # Errors
    ///
    /// [`Error::AmbiguousIdentifier`] if `key` is already registered.
    pub fn insert(&mut self, key: &str, display_name: &str, node_id: &str) -> Result<()> {
        if self.by_key.contains_key(key) {
            return Err(Error::AmbiguousIdentifier(format!("duplicate node key {key}")));
        }
        self.by_key.insert(key.to_string(), node_id.to_string());

        if display_name != key {
            self.by_name
                .entry(display_name.to_string())
                .and_modify(|entry| {
                    if !matches!(entry, NameEntry::Unique(id) if id == node_id) {
                        *entry = NameEntry::Ambiguous;
                    }
                })
                .or_insert_with(|| NameEntry::Unique(node_id.to_string()));
        }
        Ok(())
    }

    /// Resolve a key or display name.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown identifier,
    /// [`Error::AmbiguousIdentifier`] for a name shared by several nodes.
    pub fn resolve(&self, ident: &str) -> Result<&str> {
        if let Some(id) = self.by_key.get(ident) {
            return Ok(id);
        }
        match self.by_name.get(ident) {
            Some(NameEntry::Unique(id)) => Ok(id),
            Some(NameEntry::Ambiguous) => Err(Error::AmbiguousIdentifier(format!(
                "display name {ident} is shared by several nodes"
            ))),
            None => Err(Error::NotFound(format!("node {ident}"))),
        }
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether no node is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
