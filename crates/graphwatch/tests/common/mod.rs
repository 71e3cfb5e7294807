//! Shared fixtures for graphwatch integration tests
//!
//! `TestRemote` plays the server side: it owns a connection wired to a
//! recording channel and offers shorthands for the events a server sends.

#![allow(dead_code)]

use std::sync::Arc;

use graphwatch::mirror::{NodeChange, NodeInfo};
use graphwatch::{
    Binder, ChannelError, Connection, Connector, Event, InfoUpdate, Notification, ObjectType,
    Permissions, Properties, ProxyId, RecordingChannel, Request,
};

pub struct TestRemote {
    pub conn: Connection<RecordingChannel>,
    pub recorder: RecordingChannel,
}

impl TestRemote {
    /// Connected, with the initial sync already acknowledged.
    pub fn watching() -> Self {
        let mut remote = Self::subscribing();
        let seq = remote.conn.pending_sync().expect("initial sync pending");
        remote.send(Event::Done { id: 0, seq });
        remote.recorder.take();
        remote
    }

    pub fn subscribing() -> Self {
        let recorder = RecordingChannel::new();
        let conn = Connection::connect(0, recorder.clone(), Arc::new(Binder::standard()))
            .expect("connect over recording channel");
        Self { conn, recorder }
    }

    pub fn send(&mut self, event: Event) -> Vec<Notification> {
        self.conn.handle_event(event).expect("event accepted")
    }

    pub fn announce(&mut self, id: u32, ty: ObjectType, props: Properties) -> Vec<Notification> {
        self.announce_tag(id, ty.type_tag(), props)
    }

    pub fn announce_tag(&mut self, id: u32, tag: &str, props: Properties) -> Vec<Notification> {
        self.send(Event::Global {
            id,
            permissions: Permissions::R | Permissions::W | Permissions::X,
            type_tag: tag.to_string(),
            version: 3,
            props,
        })
    }

    pub fn proxy_of(&self, id: u32) -> ProxyId {
        self.conn
            .global(id)
            .and_then(|g| g.proxy())
            .expect("global is bound")
    }

    pub fn node_info(&mut self, id: u32, mask: NodeChange, props: Properties) -> Vec<Notification> {
        let proxy = self.proxy_of(id);
        self.send(Event::Info {
            proxy,
            info: InfoUpdate::Node(NodeInfo {
                id,
                change_mask: mask,
                props,
                ..NodeInfo::default()
            }),
        })
    }

    pub fn requests(&self) -> Vec<Request> {
        self.recorder.requests()
    }
}

/// Connector handing out recording channels, keeping a clone of each.
#[derive(Default)]
pub struct LoopbackConnector {
    pub opened: Vec<RecordingChannel>,
}

impl Connector for LoopbackConnector {
    type Channel = RecordingChannel;

    fn open(&mut self, _remote_name: Option<&str>) -> Result<RecordingChannel, ChannelError> {
        let channel = RecordingChannel::new();
        self.opened.push(channel.clone());
        Ok(channel)
    }
}

pub fn node_props(name: &str) -> Properties {
    Properties::from([
        ("node.name", name),
        ("media.class", "Audio/Sink"),
    ])
}
