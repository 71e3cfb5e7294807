//! Type dispatch: which local proxy to build for a registry type tag.

use std::collections::HashMap;
use thiserror::Error;

use crate::mirror::{
    ClientInfo, CoreInfo, DeviceInfo, EndpointInfo, EndpointStreamInfo, FactoryInfo, InfoSink,
    LinkInfo, MetadataMirror, Mirror, ModuleInfo, NodeInfo, PortInfo, SessionInfo,
};
use crate::types::ObjectType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("unsupported type {0}")]
    UnsupportedType(String),
}

bitflags::bitflags! {
    /// Events a bound proxy accepts besides `destroyed`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventMask: u8 {
        const INFO = 1 << 0;
        const PARAM = 1 << 1;
        const PERMISSIONS = 1 << 2;
        const PROPERTY = 1 << 3;
    }
}

/// One row of the dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct BindSpec {
    pub object_type: ObjectType,
    pub version: u32,
    pub events: EventMask,
    pub new_sink: fn() -> Box<dyn InfoSink>,
}

impl BindSpec {
    pub fn type_tag(&self) -> &'static str {
        self.object_type.type_tag()
    }
}

fn sink<S: InfoSink + Default + 'static>() -> Box<dyn InfoSink> {
    Box::<S>::default()
}

fn standard_specs() -> Vec<BindSpec> {
    use EventMask as E;
    fn row(
        object_type: ObjectType,
        version: u32,
        events: EventMask,
        new_sink: fn() -> Box<dyn InfoSink>,
    ) -> BindSpec {
        BindSpec {
            object_type,
            version,
            events,
            new_sink,
        }
    }
    vec![
        row(ObjectType::Core, 3, E::INFO, sink::<Mirror<CoreInfo>>),
        row(ObjectType::Module, 3, E::INFO, sink::<Mirror<ModuleInfo>>),
        row(ObjectType::Device, 3, E::INFO | E::PARAM, sink::<Mirror<DeviceInfo>>),
        row(ObjectType::Node, 3, E::INFO | E::PARAM, sink::<Mirror<NodeInfo>>),
        row(ObjectType::Port, 3, E::INFO | E::PARAM, sink::<Mirror<PortInfo>>),
        row(ObjectType::Factory, 3, E::INFO, sink::<Mirror<FactoryInfo>>),
        row(ObjectType::Client, 3, E::INFO | E::PERMISSIONS, sink::<Mirror<ClientInfo>>),
        row(ObjectType::Link, 3, E::INFO, sink::<Mirror<LinkInfo>>),
        row(ObjectType::Session, 0, E::INFO | E::PARAM, sink::<Mirror<SessionInfo>>),
        row(ObjectType::Endpoint, 0, E::INFO | E::PARAM, sink::<Mirror<EndpointInfo>>),
        row(
            ObjectType::EndpointStream,
            0,
            E::INFO | E::PARAM,
            sink::<Mirror<EndpointStreamInfo>>,
        ),
        row(ObjectType::Metadata, 3, E::PROPERTY, sink::<MetadataMirror>),
    ]
}

/// Type tag to [`BindSpec`] lookup.
#[derive(Debug, Clone, Default)]
pub struct Binder {
    specs: HashMap<&'static str, BindSpec>,
}

impl Binder {
    /// Empty table; see [`Binder::standard`] for the usual one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every supported interface.
    pub fn standard() -> Self {
        let mut binder = Self::new();
        for spec in standard_specs() {
            binder.register(spec);
        }
        binder
    }

    /// Add or replace a row, returning the replaced one.
    pub fn register(&mut self, spec: BindSpec) -> Option<BindSpec> {
        self.specs.insert(spec.type_tag(), spec)
    }

    pub fn lookup(&self, type_tag: &str) -> Result<&BindSpec, BindError> {
        self.specs
            .get(type_tag)
            .ok_or_else(|| BindError::UnsupportedType(type_tag.to_string()))
    }

    pub fn supports(&self, type_tag: &str) -> bool {
        self.specs.contains_key(type_tag)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
