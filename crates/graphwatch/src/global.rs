//! Globals: descriptors of remote objects announced by the registry.

use serde::Serialize;

use crate::id_table::IdTable;
use crate::props::Properties;
use crate::types::{ObjectType, Permissions, ProxyId};

/// One remote object as seen through the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Global {
    pub id: u32,
    pub permissions: Permissions,
    pub type_tag: String,
    pub version: u32,
    pub props: Properties,
    pub(crate) proxy: Option<ProxyId>,
    pub(crate) info_pending: bool,
}

impl Global {
    pub fn new(
        id: u32,
        permissions: Permissions,
        type_tag: impl Into<String>,
        version: u32,
        props: Properties,
    ) -> Self {
        Self {
            id,
            permissions,
            type_tag: type_tag.into(),
            version,
            props,
            proxy: None,
            info_pending: false,
        }
    }

    /// The proxy bound to this global, if any.
    pub fn proxy(&self) -> Option<ProxyId> {
        self.proxy
    }

    pub fn is_bound(&self) -> bool {
        self.proxy.is_some()
    }

    /// True while a requested info print waits for the first info event.
    pub fn info_pending(&self) -> bool {
        self.info_pending
    }

    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::from_type_tag(&self.type_tag)
    }

    pub fn is_type(&self, ty: ObjectType) -> bool {
        self.type_tag == ty.type_tag()
    }
}

/// All globals of one connection, addressed by server id.
#[derive(Debug, Default)]
pub struct GlobalTable {
    entries: IdTable<Global>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self {
            entries: IdTable::with_capacity(64),
        }
    }

    /// Store a global at its own id, returning whatever lived there before.
    pub fn insert(&mut self, global: Global) -> Option<Global> {
        self.entries.insert_at(global.id, global)
    }

    pub fn remove(&mut self, id: u32) -> Option<Global> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: u32) -> Option<&Global> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Global> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Global> {
        self.entries.iter().map(|(_, global)| global)
    }

    /// Globals whose type tag contains `filter`, all of them for `None`.
    pub fn matching<'a>(&'a self, filter: Option<&'a str>) -> impl Iterator<Item = &'a Global> {
        self.iter()
            .filter(move |global| filter.map_or(true, |f| global.type_tag.contains(f)))
    }

    pub(crate) fn drain(&mut self) -> Vec<Global> {
        self.entries
            .drain()
            .into_iter()
            .map(|(_, global)| global)
            .collect()
    }
}
