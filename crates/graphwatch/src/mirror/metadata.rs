//! Metadata objects: a key/value store per subject id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{Applied, InfoRef, InfoSink, InfoUpdate, MirrorError};
use crate::types::ObjectType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub value: String,
}

/// Everything a metadata object announced so far, by subject then key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataState {
    subjects: BTreeMap<u32, BTreeMap<String, MetadataEntry>>,
}

impl MetadataState {
    pub fn get(&self, subject: u32, key: &str) -> Option<&MetadataEntry> {
        self.subjects.get(&subject)?.get(key)
    }

    pub fn value(&self, subject: u32, key: &str) -> Option<&str> {
        self.get(subject, key).map(|entry| entry.value.as_str())
    }

    pub fn subject(&self, subject: u32) -> impl Iterator<Item = (&str, &MetadataEntry)> {
        self.subjects
            .get(&subject)
            .into_iter()
            .flat_map(|keys| keys.iter().map(|(k, e)| (k.as_str(), e)))
    }

    /// Number of keys across all subjects.
    pub fn len(&self) -> usize {
        self.subjects.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    fn apply(&mut self, subject: u32, key: Option<&str>, type_: Option<&str>, value: Option<&str>) {
        let Some(key) = key else {
            self.subjects.remove(&subject);
            return;
        };
        match value {
            Some(value) => {
                self.subjects.entry(subject).or_default().insert(
                    key.to_string(),
                    MetadataEntry {
                        type_: type_.map(str::to_string),
                        value: value.to_string(),
                    },
                );
            }
            None => {
                if let Some(keys) = self.subjects.get_mut(&subject) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.subjects.remove(&subject);
                    }
                }
            }
        }
    }
}

/// Sink for metadata proxies; only `property` events are accepted.
#[derive(Debug, Default)]
pub struct MetadataMirror {
    state: MetadataState,
    changed: bool,
}

impl MetadataMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &MetadataState {
        &self.state
    }

    /// True when a property arrived since the last [`InfoSink::clear_change_mask`].
    pub fn changed(&self) -> bool {
        self.changed
    }
}

impl InfoSink for MetadataMirror {
    fn object_type(&self) -> ObjectType {
        ObjectType::Metadata
    }

    fn apply(&mut self, _update: &InfoUpdate) -> Result<Applied, MirrorError> {
        Err(MirrorError::Unsupported {
            object_type: ObjectType::Metadata,
            event: "info",
        })
    }

    fn apply_property(
        &mut self,
        subject: u32,
        key: Option<&str>,
        type_: Option<&str>,
        value: Option<&str>,
    ) -> Result<(), MirrorError> {
        self.state.apply(subject, key, type_, value);
        self.changed = true;
        Ok(())
    }

    fn info(&self) -> Option<InfoRef<'_>> {
        Some(InfoRef::Metadata(&self.state))
    }

    fn clear_change_mask(&mut self) {
        self.changed = false;
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mark = super::print::mark(self.changed);
        writeln!(out, "{}\tproperties: ({})", mark, self.state.len())?;
        if self.state.is_empty() {
            return writeln!(out, "\t\tnone");
        }
        for (subject, keys) in &self.state.subjects {
            for (key, entry) in keys {
                writeln!(
                    out,
                    "{}\t\t{}: {} = \"{}\" ({})",
                    mark,
                    subject,
                    key,
                    entry.value,
                    entry.type_.as_deref().unwrap_or("")
                )?;
            }
        }
        Ok(())
    }
}
