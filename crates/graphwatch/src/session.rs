//! Several connections behind user-facing handles
//!
//! A [`Session`] keeps one identifier table of vars: every connection is a
//! var, and so is every proxy created through [`Session::create_object`].
//! Commands refer to remotes and created objects by these small ids.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::binder::Binder;
use crate::connection::{Connection, ConnectionError, Notification};
use crate::id_table::IdTable;
use crate::props::Properties;
use crate::protocol::{Channel, ChannelError, Event};
use crate::types::{ObjectType, ProxyId};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Remote {0} does not exist")]
    NoRemote(u32),

    #[error("no remote connected")]
    NoCurrent,

    #[error("failed to open remote: {0}")]
    Open(#[from] ChannelError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("remote {remote} closed after a fatal error: {source}")]
    Fatal {
        remote: u32,
        source: ConnectionError,
    },
}

/// Opens channels to servers.
pub trait Connector {
    type Channel: Channel;

    /// Open a channel to the server called `remote_name`, or the default one.
    fn open(&mut self, remote_name: Option<&str>) -> Result<Self::Channel, ChannelError>;
}

/// What a session handle refers to.
#[derive(Debug)]
pub enum Var<C: Channel> {
    Remote(Connection<C>),
    Proxy { remote: u32, proxy: ProxyId },
}

pub struct Session<K: Connector> {
    connector: K,
    binder: Arc<Binder>,
    vars: IdTable<Var<K::Channel>>,
    /// Remote ids, least recently used first.
    remotes: Vec<u32>,
    current: Option<u32>,
    eager_bind: bool,
}

impl<K: Connector> Session<K> {
    pub fn new(connector: K, binder: Arc<Binder>) -> Self {
        Self {
            connector,
            binder,
            vars: IdTable::new(),
            remotes: Vec::new(),
            current: None,
            eager_bind: true,
        }
    }

    /// Eager binding applied to connections opened from now on.
    pub fn with_eager_bind(mut self, eager: bool) -> Self {
        self.eager_bind = eager;
        self
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Open a connection and make it current. Nothing is registered on failure.
    pub fn connect(&mut self, remote_name: Option<&str>) -> Result<u32, SessionError> {
        let channel = self.connector.open(remote_name)?;
        let binder = self.binder.clone();
        let eager = self.eager_bind;
        let id = self.vars.try_insert_with(|id| {
            let mut conn = Connection::connect(id, channel, binder)?;
            conn.set_eager_bind(eager);
            Ok::<_, ConnectionError>(Var::Remote(conn))
        })?;
        self.remotes.push(id);
        self.current = Some(id);
        info!("remote {} opened ({})", id, remote_name.unwrap_or("default"));
        Ok(id)
    }

    /// Close remote `remote` (the current one for `None`).
    ///
    /// Proxy vars of that remote are dropped too; the most recently used
    /// remaining remote becomes current.
    pub fn disconnect(&mut self, remote: Option<u32>) -> Result<Vec<Notification>, SessionError> {
        let id = remote.or(self.current).ok_or(SessionError::NoCurrent)?;
        if self.connection(id).is_none() {
            return Err(SessionError::NoRemote(id));
        }
        let notifications = match self.vars.remove(id) {
            Some(Var::Remote(mut conn)) => conn.teardown(),
            _ => Vec::new(),
        };
        let owned: Vec<u32> = self
            .vars
            .iter()
            .filter(|(_, var)| matches!(var, Var::Proxy { remote, .. } if *remote == id))
            .map(|(var, _)| var)
            .collect();
        for var in owned {
            self.vars.remove(var);
        }
        self.remotes.retain(|r| *r != id);
        if self.current == Some(id) {
            self.current = self.remotes.last().copied();
        }
        Ok(notifications)
    }

    pub fn switch_remote(&mut self, remote: u32) -> Result<(), SessionError> {
        if self.connection(remote).is_none() {
            return Err(SessionError::NoRemote(remote));
        }
        self.remotes.retain(|r| *r != remote);
        self.remotes.push(remote);
        self.current = Some(remote);
        Ok(())
    }

    pub fn current(&self) -> Option<u32> {
        self.current
    }

    /// Live connections, least recently used first.
    pub fn remotes(&self) -> impl Iterator<Item = (u32, &Connection<K::Channel>)> {
        self.remotes
            .iter()
            .filter_map(|id| self.connection(*id).map(|conn| (*id, conn)))
    }

    pub fn var(&self, id: u32) -> Option<&Var<K::Channel>> {
        self.vars.get(id)
    }

    pub fn connection(&self, remote: u32) -> Option<&Connection<K::Channel>> {
        match self.vars.get(remote) {
            Some(Var::Remote(conn)) => Some(conn),
            _ => None,
        }
    }

    pub fn connection_mut(&mut self, remote: u32) -> Option<&mut Connection<K::Channel>> {
        match self.vars.get_mut(remote) {
            Some(Var::Remote(conn)) => Some(conn),
            _ => None,
        }
    }

    pub fn current_connection_mut(&mut self) -> Result<&mut Connection<K::Channel>, SessionError> {
        let id = self.current.ok_or(SessionError::NoCurrent)?;
        self.connection_mut(id).ok_or(SessionError::NoRemote(id))
    }

    /// Route an event to `remote`.
    ///
    /// A fatal core error closes the remote before the error is returned.
    pub fn handle_event(&mut self, remote: u32, event: Event) -> Result<Vec<Notification>, SessionError> {
        let conn = self.connection_mut(remote).ok_or(SessionError::NoRemote(remote))?;
        match conn.handle_event(event) {
            Ok(notifications) => {
                self.forget_destroyed(remote, &notifications);
                Ok(notifications)
            }
            Err(err @ ConnectionError::Fatal { .. }) => {
                warn!("remote {} fatal error, disconnecting", remote);
                self.disconnect(Some(remote))?;
                Err(SessionError::Fatal { remote, source: err })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Create an object on the current remote and register it as a var.
    pub fn create_object(
        &mut self,
        factory: &str,
        object_type: ObjectType,
        props: Properties,
    ) -> Result<u32, SessionError> {
        let remote = self.current.ok_or(SessionError::NoCurrent)?;
        let conn = self.connection_mut(remote).ok_or(SessionError::NoRemote(remote))?;
        let proxy = conn.create_object(factory, object_type, props)?;
        Ok(self.vars.insert(Var::Proxy { remote, proxy }))
    }

    /// Close every remote.
    pub fn shutdown(&mut self) -> Vec<(u32, Notification)> {
        let mut all = Vec::new();
        for remote in self.remotes.clone() {
            match self.disconnect(Some(remote)) {
                Ok(notifications) => all.extend(notifications.into_iter().map(|n| (remote, n))),
                Err(err) => warn!("remote {} shutdown: {}", remote, err),
            }
        }
        all
    }

    fn forget_destroyed(&mut self, remote: u32, notifications: &[Notification]) {
        for notification in notifications {
            if let Notification::ProxyDestroyed { proxy, .. } = notification {
                let stale: Vec<u32> = self
                    .vars
                    .iter()
                    .filter(|(_, var)| {
                        matches!(var, Var::Proxy { remote: r, proxy: p } if *r == remote && p == proxy)
                    })
                    .map(|(var, _)| var)
                    .collect();
                for var in stale {
                    self.vars.remove(var);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RecordingChannel, Request};

    #[derive(Default)]
    struct Loopback {
        opened: Vec<RecordingChannel>,
        refuse: bool,
    }

    impl Connector for Loopback {
        type Channel = RecordingChannel;

        fn open(&mut self, _remote_name: Option<&str>) -> Result<RecordingChannel, ChannelError> {
            if self.refuse {
                return Err(ChannelError::Rejected("no server".into()));
            }
            let channel = RecordingChannel::new();
            self.opened.push(channel.clone());
            Ok(channel)
        }
    }

    fn session() -> Session<Loopback> {
        Session::new(Loopback::default(), Arc::new(Binder::standard()))
    }

    #[test]
    fn test_connect_assigns_vars() {
        let mut session = session();
        assert_eq!(session.connect(None).unwrap(), 0);
        assert_eq!(session.connect(Some("other")).unwrap(), 1);
        assert_eq!(session.current(), Some(1));
        let ids: Vec<u32> = session.remotes().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_failed_connect_registers_nothing() {
        let mut session = Session::new(
            Loopback {
                refuse: true,
                ..Loopback::default()
            },
            Arc::new(Binder::standard()),
        );
        assert!(matches!(session.connect(None), Err(SessionError::Open(_))));
        assert_eq!(session.current(), None);
        assert_eq!(session.remotes().count(), 0);
    }

    #[test]
    fn test_disconnect_falls_back_to_last_used() {
        let mut session = session();
        session.connect(None).unwrap();
        session.connect(None).unwrap();
        session.connect(None).unwrap();
        session.switch_remote(0).unwrap();
        session.disconnect(None).unwrap();
        assert_eq!(session.current(), Some(2));
        assert!(session.connection(0).is_none());
        assert_eq!(
            session.connector().opened[0].requests().last(),
            Some(&Request::Disconnect)
        );
    }

    #[test]
    fn test_unknown_remote() {
        let mut session = session();
        assert!(matches!(session.switch_remote(4), Err(SessionError::NoRemote(4))));
        assert_eq!(
            session.disconnect(Some(4)).unwrap_err().to_string(),
            "Remote 4 does not exist"
        );
        assert!(matches!(session.disconnect(None), Err(SessionError::NoCurrent)));
    }

    #[test]
    fn test_created_object_var_dropped_with_remote() {
        let mut session = session();
        let remote = session.connect(None).unwrap();
        let var = session
            .create_object("adapter", ObjectType::Node, Properties::new())
            .unwrap();
        assert!(matches!(
            session.var(var),
            Some(Var::Proxy { remote: 0, proxy: ProxyId(2) })
        ));
        session.disconnect(Some(remote)).unwrap();
        assert!(session.var(var).is_none());
    }

    #[test]
    fn test_fatal_error_closes_remote() {
        let mut session = session();
        let remote = session.connect(None).unwrap();
        let err = session
            .handle_event(
                remote,
                Event::Error {
                    id: 0,
                    seq: 0,
                    res: -32,
                    message: "broken pipe".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::Fatal { remote: 0, .. }));
        assert!(session.connection(remote).is_none());
        assert_eq!(session.current(), None);
    }

    #[test]
    fn test_shutdown_closes_everything() {
        let mut session = session();
        session.connect(None).unwrap();
        session.connect(None).unwrap();
        session.shutdown();
        assert_eq!(session.remotes().count(), 0);
        assert_eq!(session.current(), None);
    }
}
