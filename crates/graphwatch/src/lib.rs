//! Client-side mirror of a media routing daemon's object graph.
//!
//! The daemon exposes a live graph of typed objects (core, modules, devices,
//! nodes, ports, links, clients, factories, sessions, endpoints, metadata).
//! This crate keeps a local, queryable copy of that graph:
//!
//! - the registry announces objects as **globals** ([`GlobalTable`]),
//! - each global can be **bound** to a local proxy chosen by its type tag
//!   ([`Binder`]),
//! - bound proxies **mirror** the object's state from change-masked info
//!   updates ([`mirror`]),
//! - a **sync barrier** tells when the server caught up with everything sent
//!   ([`SyncBarrier`]).
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use graphwatch::{Binder, Connection, Event, RecordingChannel};
//!
//! let channel = RecordingChannel::new();
//! let mut conn = Connection::connect(0, channel, Arc::new(Binder::standard()))?;
//!
//! // feed decoded events from the transport
//! let event: Event = serde_json::from_str(
//!     r#"{"event":"global","id":3,"permissions":448,"type":"PipeWire:Interface:Node","version":3}"#,
//! )?;
//! for notification in conn.handle_event(event)? {
//!     println!("{:?}", notification);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Everything in the core is synchronous and single-owner. [`driver`] runs a
//! [`Session`] on a tokio task when events arrive from elsewhere.

pub mod binder;
pub mod connection;
pub mod driver;
pub mod global;
pub mod id_table;
pub mod mirror;
pub mod policy;
pub mod props;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod sync;
pub mod types;

pub use binder::{BindError, BindSpec, Binder, EventMask};
pub use connection::{Connection, ConnectionError, InfoRequest, Notification, Proxy, ProxyRole};
pub use driver::{DriverError, SessionHandle};
pub use global::{Global, GlobalTable};
pub use id_table::IdTable;
pub use mirror::{InfoRef, InfoSink, InfoUpdate, Mirror, MirrorError, ObjectInfo};
pub use props::Properties;
pub use protocol::{Channel, ChannelError, Event, MpscChannel, RecordingChannel, Request};
pub use registry::{RegistryWatcher, WatchError, WatchState, GLOBAL_ID_LIMIT};
pub use session::{Connector, Session, SessionError, Var};
pub use sync::{SyncBarrier, SyncOutcome};
pub use types::{
    Direction, LinkState, NodeState, ObjectType, ParamFlags, ParamInfo, ParamType, Permission,
    Permissions, Pod, ProxyId, ID_ANY, ID_CORE,
};
