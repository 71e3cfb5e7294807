//! Info mirrors: locally cached state of bound remote objects
//!
//! Every bound proxy owns one [`InfoSink`]. For ordinary objects that sink is
//! a [`Mirror`] over a concrete info type; the mirror folds each incoming
//! update into its cache following the update's change mask:
//!
//! - the first update creates the cache and copies identity fields,
//! - a field group is replaced only when its bit is set in the mask,
//! - variable-length fields (properties, param lists) are replaced wholesale,
//! - the cached mask becomes the incoming mask until a consumer clears it.
//!
//! Merging is idempotent: replaying an update yields the same state and mask.

pub mod core;
pub mod media;
pub mod metadata;
pub mod print;
pub mod session;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::ObjectType;

pub use self::core::{ClientChange, ClientInfo, CoreChange, CoreInfo, FactoryChange, FactoryInfo, ModuleChange, ModuleInfo};
pub use media::{DeviceChange, DeviceInfo, LinkChange, LinkInfo, NodeChange, NodeInfo, PortChange, PortInfo};
pub use metadata::{MetadataEntry, MetadataMirror, MetadataState};
pub use session::{
    EndpointChange, EndpointInfo, EndpointStreamChange, EndpointStreamInfo, SessionChange,
    SessionInfo,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    #[error("{got} info delivered to a {expected} proxy")]
    TypeMismatch { expected: ObjectType, got: ObjectType },

    #[error("{object_type} {got} info delivered to the mirror of {cached}")]
    IdMismatch {
        object_type: ObjectType,
        cached: u32,
        got: u32,
    },

    #[error("{object_type} objects have no {event} event")]
    Unsupported {
        object_type: ObjectType,
        event: &'static str,
    },
}

/// A full or partial state update, as carried by an `info` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InfoUpdate {
    Core(CoreInfo),
    Module(ModuleInfo),
    Device(DeviceInfo),
    Node(NodeInfo),
    Port(PortInfo),
    Factory(FactoryInfo),
    Client(ClientInfo),
    Link(LinkInfo),
    Session(SessionInfo),
    Endpoint(EndpointInfo),
    EndpointStream(EndpointStreamInfo),
}

/// Borrowed view of a cached mirror.
#[derive(Debug, Clone, Copy)]
pub enum InfoRef<'a> {
    Core(&'a CoreInfo),
    Module(&'a ModuleInfo),
    Device(&'a DeviceInfo),
    Node(&'a NodeInfo),
    Port(&'a PortInfo),
    Factory(&'a FactoryInfo),
    Client(&'a ClientInfo),
    Link(&'a LinkInfo),
    Session(&'a SessionInfo),
    Endpoint(&'a EndpointInfo),
    EndpointStream(&'a EndpointStreamInfo),
    Metadata(&'a MetadataState),
}

/// Maps a concrete info type to its [`InfoUpdate`] and [`InfoRef`] variants.
pub trait InfoVariant {
    fn from_update(update: &InfoUpdate) -> Option<&Self>;
    fn as_info_ref(&self) -> InfoRef<'_>;
    fn from_info_ref<'a>(info: InfoRef<'a>) -> Option<&'a Self>;
}

macro_rules! info_variants {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl InfoVariant for $ty {
                fn from_update(update: &InfoUpdate) -> Option<&Self> {
                    match update {
                        InfoUpdate::$variant(info) => Some(info),
                        _ => None,
                    }
                }

                fn as_info_ref(&self) -> InfoRef<'_> {
                    InfoRef::$variant(self)
                }

                fn from_info_ref<'a>(info: InfoRef<'a>) -> Option<&'a Self> {
                    match info {
                        InfoRef::$variant(info) => Some(info),
                        _ => None,
                    }
                }
            }
        )*

        impl InfoUpdate {
            pub fn object_type(&self) -> ObjectType {
                match self {
                    $(InfoUpdate::$variant(_) => ObjectType::$variant,)*
                }
            }

            /// Server id of the object the update describes.
            pub fn id(&self) -> u32 {
                match self {
                    $(InfoUpdate::$variant(info) => info.id,)*
                }
            }
        }
    };
}

info_variants! {
    Core => CoreInfo,
    Module => ModuleInfo,
    Device => DeviceInfo,
    Node => NodeInfo,
    Port => PortInfo,
    Factory => FactoryInfo,
    Client => ClientInfo,
    Link => LinkInfo,
    Session => SessionInfo,
    Endpoint => EndpointInfo,
    EndpointStream => EndpointStreamInfo,
}

impl InfoRef<'_> {
    pub fn object_type(&self) -> ObjectType {
        match self {
            InfoRef::Core(_) => ObjectType::Core,
            InfoRef::Module(_) => ObjectType::Module,
            InfoRef::Device(_) => ObjectType::Device,
            InfoRef::Node(_) => ObjectType::Node,
            InfoRef::Port(_) => ObjectType::Port,
            InfoRef::Factory(_) => ObjectType::Factory,
            InfoRef::Client(_) => ObjectType::Client,
            InfoRef::Link(_) => ObjectType::Link,
            InfoRef::Session(_) => ObjectType::Session,
            InfoRef::Endpoint(_) => ObjectType::Endpoint,
            InfoRef::EndpointStream(_) => ObjectType::EndpointStream,
            InfoRef::Metadata(_) => ObjectType::Metadata,
        }
    }
}

/// Per-type state with a change-masked merge.
pub trait ObjectInfo: InfoVariant + Clone + fmt::Debug + Send + 'static {
    const TYPE: ObjectType;

    /// Field groups that an update may carry.
    type Change: Copy + fmt::Debug + PartialEq;

    fn id(&self) -> u32;

    fn change_mask(&self) -> Self::Change;

    fn clear_change_mask(&mut self);

    /// Fold `incoming` into `cached`, creating the cache on first use.
    fn update(cached: Option<Self>, incoming: &Self) -> Self;

    /// Human readable dump; changed groups are marked with `*`.
    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

/// Result of applying one info event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Server id reported by the update.
    pub id: u32,
    /// True when this update created the cache.
    pub first: bool,
}

/// Event sink owned by a proxy.
///
/// Dropping the sink releases the cached info; it is the destroy hook of a
/// proxy's mirror.
pub trait InfoSink: fmt::Debug + Send {
    fn object_type(&self) -> ObjectType;

    fn apply(&mut self, update: &InfoUpdate) -> Result<Applied, MirrorError>;

    fn apply_property(
        &mut self,
        _subject: u32,
        _key: Option<&str>,
        _type_: Option<&str>,
        _value: Option<&str>,
    ) -> Result<(), MirrorError> {
        Err(MirrorError::Unsupported {
            object_type: self.object_type(),
            event: "property",
        })
    }

    fn info(&self) -> Option<InfoRef<'_>>;

    fn clear_change_mask(&mut self);

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

/// Cache of one object's info.
#[derive(Debug)]
pub struct Mirror<I> {
    cached: Option<I>,
}

impl<I: ObjectInfo> Mirror<I> {
    pub fn new() -> Self {
        Self { cached: None }
    }

    pub fn get(&self) -> Option<&I> {
        self.cached.as_ref()
    }
}

impl<I: ObjectInfo> Default for Mirror<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ObjectInfo> InfoSink for Mirror<I> {
    fn object_type(&self) -> ObjectType {
        I::TYPE
    }

    fn apply(&mut self, update: &InfoUpdate) -> Result<Applied, MirrorError> {
        let incoming = I::from_update(update).ok_or(MirrorError::TypeMismatch {
            expected: I::TYPE,
            got: update.object_type(),
        })?;
        if let Some(cached) = &self.cached {
            if cached.id() != incoming.id() {
                return Err(MirrorError::IdMismatch {
                    object_type: I::TYPE,
                    cached: cached.id(),
                    got: incoming.id(),
                });
            }
        }
        let first = self.cached.is_none();
        let merged = I::update(self.cached.take(), incoming);
        let id = merged.id();
        self.cached = Some(merged);
        Ok(Applied { id, first })
    }

    fn info(&self) -> Option<InfoRef<'_>> {
        self.cached.as_ref().map(InfoVariant::as_info_ref)
    }

    fn clear_change_mask(&mut self) {
        if let Some(info) = self.cached.as_mut() {
            info.clear_change_mask();
        }
    }

    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        match &self.cached {
            Some(info) => info.describe(out),
            None => writeln!(out, "\tinfo: none"),
        }
    }
}

/// Sink for proxies that never carry mirrored state (the registry).
#[derive(Debug)]
pub struct Unmirrored(pub ObjectType);

impl InfoSink for Unmirrored {
    fn object_type(&self) -> ObjectType {
        self.0
    }

    fn apply(&mut self, _update: &InfoUpdate) -> Result<Applied, MirrorError> {
        Err(MirrorError::Unsupported {
            object_type: self.0,
            event: "info",
        })
    }

    fn info(&self) -> Option<InfoRef<'_>> {
        None
    }

    fn clear_change_mask(&mut self) {}

    fn describe(&self, _out: &mut dyn fmt::Write) -> fmt::Result {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::{keys, Properties};

    #[test]
    fn test_mirror_rejects_foreign_update() {
        let mut mirror = Mirror::<NodeInfo>::new();
        let err = mirror
            .apply(&InfoUpdate::Port(PortInfo::default()))
            .unwrap_err();
        assert_eq!(
            err,
            MirrorError::TypeMismatch {
                expected: ObjectType::Node,
                got: ObjectType::Port,
            }
        );
        assert!(mirror.get().is_none());
    }

    #[test]
    fn test_mirror_reports_first_update() {
        let mut mirror = Mirror::<ClientInfo>::new();
        let update = InfoUpdate::Client(ClientInfo {
            id: 31,
            change_mask: ClientChange::PROPS,
            props: Properties::from([(keys::REMOTE_NAME, "pipewire-0")]),
        });

        assert_eq!(mirror.apply(&update).unwrap(), Applied { id: 31, first: true });
        assert_eq!(mirror.apply(&update).unwrap(), Applied { id: 31, first: false });
    }

    #[test]
    fn test_mirror_rejects_other_object_id() {
        let mut mirror = Mirror::<ClientInfo>::new();
        let update = |id: u32, name: &str| {
            InfoUpdate::Client(ClientInfo {
                id,
                change_mask: ClientChange::PROPS,
                props: Properties::from([(keys::REMOTE_NAME, name)]),
            })
        };
        mirror.apply(&update(4, "pipewire-0")).unwrap();

        let err = mirror.apply(&update(3, "stale")).unwrap_err();
        assert_eq!(
            err,
            MirrorError::IdMismatch {
                object_type: ObjectType::Client,
                cached: 4,
                got: 3,
            }
        );
        assert_eq!(mirror.get().unwrap().id, 4);
        assert_eq!(mirror.get().unwrap().props.get(keys::REMOTE_NAME), Some("pipewire-0"));
    }

    #[test]
    fn test_clear_change_mask() {
        let mut mirror = Mirror::<ClientInfo>::new();
        let update = InfoUpdate::Client(ClientInfo {
            id: 1,
            change_mask: ClientChange::PROPS,
            props: Properties::new(),
        });
        mirror.apply(&update).unwrap();
        mirror.clear_change_mask();
        assert!(mirror.get().unwrap().change_mask.is_empty());
    }

    #[test]
    fn test_info_update_json_shape() {
        let json = r#"{"type":"node","id":3,"change_mask":8,"props":{"media.class":"Audio/Sink"}}"#;
        let update: InfoUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.object_type(), ObjectType::Node);
        assert_eq!(update.id(), 3);
    }

    #[test]
    fn test_unmirrored_rejects_info() {
        let mut sink = Unmirrored(ObjectType::Registry);
        assert!(sink.apply(&InfoUpdate::Node(NodeInfo::default())).is_err());
        assert!(sink.info().is_none());
    }
}
