//! Key/value property sets attached to globals and info updates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known property keys.
pub mod keys {
    pub const NODE_NAME: &str = "node.name";
    pub const NODE_DESCRIPTION: &str = "node.description";
    pub const MEDIA_CLASS: &str = "media.class";
    pub const REMOTE_NAME: &str = "remote.name";
    pub const METADATA_NAME: &str = "metadata.name";
    pub const LINK_OUTPUT_NODE: &str = "link.output.node";
    pub const LINK_OUTPUT_PORT: &str = "link.output.port";
    pub const LINK_INPUT_NODE: &str = "link.input.node";
    pub const LINK_INPUT_PORT: &str = "link.input.port";
}

/// Unordered string properties; iteration is sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse whitespace separated `key=value` tokens.
    ///
    /// Tokens without `=` are skipped; the value is everything after the
    /// first `=`.
    pub fn parse(input: &str) -> Self {
        input
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Properties {
    fn from(items: [(K, V); N]) -> Self {
        items.into_iter().collect()
    }
}
