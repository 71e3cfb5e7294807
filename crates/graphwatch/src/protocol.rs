//! Typed messages exchanged with the server and the channel abstraction
//!
//! The wire encoding is owned by whoever implements [`Channel`]; this crate
//! only sees decoded [`Event`]s going in and [`Request`]s going out. Both are
//! serde types so they can be scripted as JSON lines.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::mirror::InfoUpdate;
use crate::props::Properties;
use crate::types::{Permission, Permissions, Pod, ProxyId};

/// Inbound message from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Registry announcement of a new (or re-announced) object.
    Global {
        id: u32,
        permissions: Permissions,
        #[serde(rename = "type")]
        type_tag: String,
        version: u32,
        #[serde(default)]
        props: Properties,
    },
    GlobalRemoved {
        id: u32,
    },
    Info {
        proxy: ProxyId,
        info: InfoUpdate,
    },
    Param {
        proxy: ProxyId,
        seq: i32,
        id: u32,
        index: u32,
        next: u32,
        param: Pod,
    },
    Permissions {
        proxy: ProxyId,
        index: u32,
        permissions: Vec<Permission>,
    },
    MetadataProperty {
        proxy: ProxyId,
        subject: u32,
        key: Option<String>,
        #[serde(rename = "type")]
        type_: Option<String>,
        value: Option<String>,
    },
    Done {
        id: u32,
        seq: u32,
    },
    Error {
        id: u32,
        seq: i32,
        res: i32,
        message: String,
    },
    /// The server dropped a proxy on its side.
    ProxyDestroyed {
        proxy: ProxyId,
    },
}

/// Outbound request to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum Request {
    GetRegistry {
        new_id: ProxyId,
        version: u32,
    },
    Sync {
        id: u32,
        seq: u32,
    },
    Bind {
        global: u32,
        #[serde(rename = "type")]
        type_tag: String,
        version: u32,
        new_id: ProxyId,
    },
    CreateObject {
        factory: String,
        #[serde(rename = "type")]
        type_tag: String,
        version: u32,
        props: Properties,
        new_id: ProxyId,
    },
    /// Ask the registry to destroy a global.
    Destroy {
        global: u32,
    },
    DestroyProxy {
        proxy: ProxyId,
    },
    EnumParams {
        proxy: ProxyId,
        seq: i32,
        id: u32,
        index: u32,
        num: u32,
    },
    UpdatePermissions {
        proxy: ProxyId,
        permissions: Vec<Permission>,
    },
    GetPermissions {
        proxy: ProxyId,
        index: u32,
        num: u32,
    },
    SetMetadataProperty {
        proxy: ProxyId,
        subject: u32,
        key: String,
        #[serde(rename = "type")]
        type_: Option<String>,
        value: Option<String>,
    },
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Outbound half of a connection to the server.
pub trait Channel: Send {
    fn send(&mut self, request: Request) -> Result<(), ChannelError>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&mut self, request: Request) -> Result<(), ChannelError> {
        (**self).send(request)
    }
}

/// Channel feeding a tokio task that owns the real transport.
#[derive(Debug, Clone)]
pub struct MpscChannel {
    tx: mpsc::UnboundedSender<Request>,
}

impl MpscChannel {
    pub fn new(tx: mpsc::UnboundedSender<Request>) -> Self {
        Self { tx }
    }

    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Channel for MpscChannel {
    fn send(&mut self, request: Request) -> Result<(), ChannelError> {
        self.tx.send(request).map_err(|_| ChannelError::Closed)
    }
}

/// In-memory channel that keeps every request it was given.
///
/// Clones share the same log, so a test can hold one clone while the
/// connection owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    log: Arc<Mutex<Vec<Request>>>,
    closed: Arc<Mutex<bool>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the requests sent so far.
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Take the requests sent so far, leaving the log empty.
    pub fn take(&self) -> Vec<Request> {
        self.log
            .lock()
            .map(|mut log| std::mem::take(&mut *log))
            .unwrap_or_default()
    }

    /// Make every later send fail with [`ChannelError::Closed`].
    pub fn close(&self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.lock().map(|closed| *closed).unwrap_or(true)
    }
}

impl Channel for RecordingChannel {
    fn send(&mut self, request: Request) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let mut log = self.log.lock().map_err(|_| ChannelError::Closed)?;
        log.push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"event":"global","id":3,"permissions":448,"type":"PipeWire:Interface:Node","version":3,"props":{"node.name":"sink"}}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        match event {
            Event::Global { id, type_tag, props, .. } => {
                assert_eq!(id, 3);
                assert_eq!(type_tag, "PipeWire:Interface:Node");
                assert_eq!(props.get("node.name"), Some("sink"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_global_props_default_to_empty() {
        let json = r#"{"event":"global","id":1,"permissions":256,"type":"x","version":0}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert!(matches!(event, Event::Global { props, .. } if props.is_empty()));
    }

    #[test]
    fn test_recording_channel_shares_log() {
        let recorder = RecordingChannel::new();
        let mut channel = recorder.clone();
        channel.send(Request::Sync { id: 0, seq: 1 }).unwrap();
        assert_eq!(recorder.requests(), vec![Request::Sync { id: 0, seq: 1 }]);
        assert_eq!(recorder.take().len(), 1);
        assert!(recorder.requests().is_empty());
    }

    #[test]
    fn test_recording_channel_close() {
        let recorder = RecordingChannel::new();
        let mut channel = recorder.clone();
        recorder.close();
        assert_eq!(channel.send(Request::Disconnect), Err(ChannelError::Closed));
        assert!(recorder.requests().is_empty());
    }

    #[tokio::test]
    async fn test_mpsc_channel_forwards() {
        let (mut channel, mut rx) = MpscChannel::pair();
        channel.send(Request::Disconnect).unwrap();
        assert_eq!(rx.recv().await, Some(Request::Disconnect));
        drop(rx);
        assert_eq!(channel.send(Request::Disconnect), Err(ChannelError::Closed));
    }
}
