//! Shared vocabulary: object types, ids, permissions, states and params.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Global id of the core object, the root of every connection.
pub const ID_CORE: u32 = 0;

/// Wildcard object id used by permission lists ("default").
pub const ID_ANY: u32 = u32::MAX;

/// Implements serde for a bitflags type as its raw integer bits.
macro_rules! bits_serde {
    ($ty:ty, $repr:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&self.bits(), serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                <$repr as serde::Deserialize>::deserialize(deserializer).map(Self::from_bits_retain)
            }
        }
    };
}
pub(crate) use bits_serde;

/// Connection-local id of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyId(pub u32);

impl ProxyId {
    /// The connection's own core proxy.
    pub const CORE: ProxyId = ProxyId(0);
    /// The registry subscription.
    pub const REGISTRY: ProxyId = ProxyId(1);
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interface types known to the binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Core,
    Registry,
    Module,
    Device,
    Node,
    Port,
    Factory,
    Client,
    Link,
    Session,
    Endpoint,
    EndpointStream,
    Metadata,
}

impl ObjectType {
    pub const ALL: [ObjectType; 13] = [
        Self::Core,
        Self::Registry,
        Self::Module,
        Self::Device,
        Self::Node,
        Self::Port,
        Self::Factory,
        Self::Client,
        Self::Link,
        Self::Session,
        Self::Endpoint,
        Self::EndpointStream,
        Self::Metadata,
    ];

    /// Type tag as announced by the registry.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Core => "PipeWire:Interface:Core",
            Self::Registry => "PipeWire:Interface:Registry",
            Self::Module => "PipeWire:Interface:Module",
            Self::Device => "PipeWire:Interface:Device",
            Self::Node => "PipeWire:Interface:Node",
            Self::Port => "PipeWire:Interface:Port",
            Self::Factory => "PipeWire:Interface:Factory",
            Self::Client => "PipeWire:Interface:Client",
            Self::Link => "PipeWire:Interface:Link",
            Self::Session => "PipeWire:Interface:Session",
            Self::Endpoint => "PipeWire:Interface:Endpoint",
            Self::EndpointStream => "PipeWire:Interface:EndpointStream",
            Self::Metadata => "PipeWire:Interface:Metadata",
        }
    }

    /// Short lowercase name used in log lines ("node", "endpoint-stream").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Registry => "registry",
            Self::Module => "module",
            Self::Device => "device",
            Self::Node => "node",
            Self::Port => "port",
            Self::Factory => "factory",
            Self::Client => "client",
            Self::Link => "link",
            Self::Session => "session",
            Self::Endpoint => "endpoint",
            Self::EndpointStream => "endpoint-stream",
            Self::Metadata => "metadata",
        }
    }

    pub fn from_type_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_tag() == tag)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

bitflags::bitflags! {
    /// What a client may do with a global.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Permissions: u32 {
        const R = 0o400;
        const W = 0o200;
        const X = 0o100;
        const M = 0o010;
    }
}

bits_serde!(Permissions, u32);

impl fmt::Display for Permissions {
    /// Renders as `rwx`, a dash for each missing flag.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |bit: Permissions, c: char| if self.contains(bit) { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(Permissions::R, 'r'),
            flag(Permissions::W, 'w'),
            flag(Permissions::X, 'x')
        )
    }
}

/// One entry of a client's permission list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: u32,
    pub permissions: Permissions,
}

impl Permission {
    pub fn new(id: u32, permissions: Permissions) -> Self {
        Self { id, permissions }
    }
}

/// Port/stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Error,
    #[default]
    Creating,
    Suspended,
    Idle,
    Running,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Creating => "creating",
            Self::Suspended => "suspended",
            Self::Idle => "idle",
            Self::Running => "running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Error,
    Unlinked,
    #[default]
    Init,
    Negotiating,
    Allocating,
    Paused,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Unlinked => "unlinked",
            Self::Init => "init",
            Self::Negotiating => "negotiating",
            Self::Allocating => "allocating",
            Self::Paused => "paused",
        }
    }
}

bitflags::bitflags! {
    /// Access flags on an advertised param.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParamFlags: u32 {
        const SERIAL = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        const READWRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

bits_serde!(ParamFlags, u32);

/// Well-known param ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Invalid = 0,
    PropInfo = 1,
    Props = 2,
    EnumFormat = 3,
    Format = 4,
    Buffers = 5,
    Meta = 6,
    Io = 7,
    EnumProfile = 8,
    Profile = 9,
    EnumPortConfig = 10,
    PortConfig = 11,
    EnumRoute = 12,
    Route = 13,
    Control = 14,
}

impl ParamType {
    const ALL: [ParamType; 15] = [
        Self::Invalid,
        Self::PropInfo,
        Self::Props,
        Self::EnumFormat,
        Self::Format,
        Self::Buffers,
        Self::Meta,
        Self::Io,
        Self::EnumProfile,
        Self::Profile,
        Self::EnumPortConfig,
        Self::PortConfig,
        Self::EnumRoute,
        Self::Route,
        Self::Control,
    ];

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|p| *p as u32 == id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::PropInfo => "PropInfo",
            Self::Props => "Props",
            Self::EnumFormat => "EnumFormat",
            Self::Format => "Format",
            Self::Buffers => "Buffers",
            Self::Meta => "Meta",
            Self::Io => "IO",
            Self::EnumProfile => "EnumProfile",
            Self::Profile => "Profile",
            Self::EnumPortConfig => "EnumPortConfig",
            Self::PortConfig => "PortConfig",
            Self::EnumRoute => "EnumRoute",
            Self::Route => "Route",
            Self::Control => "Control",
        }
    }

    /// Name for an arbitrary param id, "unknown" when not well-known.
    pub fn name_of(id: u32) -> &'static str {
        Self::from_id(id).map(|p| p.name()).unwrap_or("unknown")
    }
}

impl FromStr for ParamType {
    type Err = String;

    /// Accepts either the numeric id or the (case-insensitive) name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<u32>() {
            return Self::from_id(id).ok_or_else(|| format!("unknown param id {}", id));
        }
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown param {}", s))
    }
}

/// Param advertised in an object's info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub id: u32,
    pub flags: ParamFlags,
}

impl ParamInfo {
    pub fn new(id: u32, flags: ParamFlags) -> Self {
        Self { id, flags }
    }
}

/// Opaque structured payload (format, param value).
///
/// The channel owns the binary encoding; this side only carries and prints it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pod(pub serde_json::Value);

impl fmt::Display for Pod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.0) {
            Ok(text) => write!(f, "{}", text),
            Err(_) => write!(f, "{}", self.0),
        }
    }
}
