//! One live session with a server
//!
//! A [`Connection`] owns the registry watcher (and through it the global
//! table), the proxy table and the sync barrier. Inbound events are applied
//! with [`Connection::handle_event`], which returns the [`Notification`]s
//! consumers act on; outbound operations go straight to the [`Channel`].
//!
//! Proxy ids 0 and 1 are reserved for the connection's own core and registry
//! proxies. Bound objects get the lowest free id above them.

use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::binder::{BindError, Binder, EventMask};
use crate::global::{Global, GlobalTable};
use crate::id_table::IdTable;
use crate::mirror::{CoreInfo, InfoRef, InfoSink, InfoUpdate, Mirror, ObjectInfo, Unmirrored};
use crate::props::Properties;
use crate::protocol::{Channel, ChannelError, Event, Request};
use crate::registry::{RegistryWatcher, WatchError, WatchState};
use crate::sync::{SyncBarrier, SyncOutcome};
use crate::types::{ObjectType, Permission, Pod, ProxyId, ID_CORE};

/// Registry interface version requested on connect.
pub const REGISTRY_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,

    #[error("unknown global {0}")]
    UnknownGlobal(u32),

    #[error("global id {0} out of range")]
    GlobalIdOutOfRange(u32),

    #[error("global {id} is already bound to proxy {proxy}")]
    AlreadyBound { id: u32, proxy: ProxyId },

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("object {id} is not a {expected}")]
    WrongType { id: u32, expected: ObjectType },

    #[error("{operation} not implemented on object {id} type:{type_tag}")]
    NotImplemented {
        operation: &'static str,
        id: u32,
        type_tag: String,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("fatal remote error seq:{seq} res:{res}: {message}")]
    Fatal { seq: i32, res: i32, message: String },
}

impl From<WatchError> for ConnectionError {
    fn from(err: WatchError) -> Self {
        match err {
            WatchError::NotConnected => ConnectionError::NotConnected,
            WatchError::IdOutOfRange(id) => ConnectionError::GlobalIdOutOfRange(id),
        }
    }
}

/// What the connection tells its consumers after applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    GlobalAdded(Global),
    Bound {
        id: u32,
        proxy: ProxyId,
    },
    BindFailed {
        id: u32,
        error: String,
    },
    GlobalRemoved(Global),
    UnknownGlobalRemoved {
        id: u32,
    },
    /// The core reported its name.
    RemoteNamed {
        name: String,
    },
    /// A cached info was updated again.
    InfoChanged {
        id: u32,
        proxy: ProxyId,
        object_type: ObjectType,
    },
    /// First info for a global whose info was requested; call
    /// [`Connection::describe`] to print it.
    InfoReady {
        id: u32,
        proxy: ProxyId,
    },
    Param {
        global: Option<u32>,
        proxy: ProxyId,
        seq: i32,
        id: u32,
        index: u32,
        next: u32,
        param: Pod,
    },
    Permissions {
        global: Option<u32>,
        proxy: ProxyId,
        index: u32,
        permissions: Vec<Permission>,
    },
    MetadataProperty {
        global: Option<u32>,
        proxy: ProxyId,
        subject: u32,
        key: Option<String>,
        type_: Option<String>,
        value: Option<String>,
    },
    SyncDone {
        seq: u32,
    },
    ObjectError {
        id: u32,
        seq: i32,
        res: i32,
        message: String,
    },
    ProxyDestroyed {
        proxy: ProxyId,
        global: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRole {
    Core,
    Registry,
    Object,
    /// Destroyed locally; the id stays taken until the server confirms.
    Destroying,
}

/// Local stand-in for a remote object.
#[derive(Debug)]
pub struct Proxy {
    id: ProxyId,
    role: ProxyRole,
    object_type: ObjectType,
    version: u32,
    events: EventMask,
    global: Option<u32>,
    sink: Box<dyn InfoSink>,
}

impl Proxy {
    fn core() -> Self {
        Self {
            id: ProxyId::CORE,
            role: ProxyRole::Core,
            object_type: ObjectType::Core,
            version: 3,
            events: EventMask::INFO,
            global: None,
            sink: Box::<Mirror<CoreInfo>>::default(),
        }
    }

    /// Placeholder holding the slot of a proxy whose destruction the server
    /// has not confirmed yet. It accepts no events.
    fn destroying(id: ProxyId, object_type: ObjectType) -> Self {
        Self {
            id,
            role: ProxyRole::Destroying,
            object_type,
            version: 0,
            events: EventMask::empty(),
            global: None,
            sink: Box::new(Unmirrored(object_type)),
        }
    }

    fn registry() -> Self {
        Self {
            id: ProxyId::REGISTRY,
            role: ProxyRole::Registry,
            object_type: ObjectType::Registry,
            version: REGISTRY_VERSION,
            events: EventMask::empty(),
            global: None,
            sink: Box::new(Unmirrored(ObjectType::Registry)),
        }
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    pub fn role(&self) -> ProxyRole {
        self.role
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn events(&self) -> EventMask {
        self.events
    }

    /// Id of the global this proxy mirrors, once known.
    pub fn global(&self) -> Option<u32> {
        self.global
    }

    pub fn info(&self) -> Option<InfoRef<'_>> {
        self.sink.info()
    }
}

/// Outcome of [`Connection::request_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoRequest {
    /// Info is cached; here it is.
    Ready(String),
    /// Waiting for the first info event; an [`Notification::InfoReady`]
    /// follows.
    Pending,
}

pub struct Connection<C: Channel> {
    remote_id: u32,
    name: Option<String>,
    channel: C,
    binder: Arc<Binder>,
    watcher: RegistryWatcher,
    proxies: IdTable<Proxy>,
    barrier: SyncBarrier,
    eager_bind: bool,
    param_seq: i32,
}

impl<C: Channel> std::fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote_id", &self.remote_id)
            .field("name", &self.name)
            .field("state", &self.watcher.state())
            .field("globals", &self.watcher.globals().len())
            .field("proxies", &self.proxies.len())
            .finish()
    }
}

impl<C: Channel> Connection<C> {
    /// Subscribe to the registry over `channel` and issue the initial sync.
    ///
    /// Nothing is kept when the channel refuses either request.
    pub fn connect(remote_id: u32, mut channel: C, binder: Arc<Binder>) -> Result<Self, ConnectionError> {
        let mut proxies = IdTable::new();
        proxies.insert(Proxy::core());
        proxies.insert(Proxy::registry());

        channel.send(Request::GetRegistry {
            new_id: ProxyId::REGISTRY,
            version: REGISTRY_VERSION,
        })?;

        let mut conn = Self {
            remote_id,
            name: None,
            channel,
            binder,
            watcher: RegistryWatcher::new(),
            proxies,
            barrier: SyncBarrier::new(),
            eager_bind: true,
            param_seq: 0,
        };
        let seq = conn.barrier.peek();
        conn.watcher.subscribe(seq);
        conn.sync()?;
        info!("remote {} connected, waiting for sync {}", remote_id, seq);
        Ok(conn)
    }

    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    /// Name reported by the server's core, once it arrived.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> WatchState {
        self.watcher.state()
    }

    pub fn is_connected(&self) -> bool {
        self.watcher.state() != WatchState::Disconnected
    }

    pub fn globals(&self) -> &GlobalTable {
        self.watcher.globals()
    }

    pub fn global(&self, id: u32) -> Option<&Global> {
        self.watcher.globals().get(id)
    }

    pub fn proxy(&self, id: ProxyId) -> Option<&Proxy> {
        self.proxies
            .get(id.0)
            .filter(|proxy| proxy.role != ProxyRole::Destroying)
    }

    pub fn proxies(&self) -> impl Iterator<Item = &Proxy> {
        self.proxies
            .iter()
            .map(|(_, proxy)| proxy)
            .filter(|proxy| proxy.role != ProxyRole::Destroying)
    }

    /// Cached info of the proxy bound to global `id`.
    pub fn info(&self, id: u32) -> Option<InfoRef<'_>> {
        let proxy = self.global(id)?.proxy()?;
        self.proxies.get(proxy.0)?.info()
    }

    pub fn info_as<I: ObjectInfo>(&self, id: u32) -> Option<&I> {
        I::from_info_ref(self.info(id)?)
    }

    pub fn pending_sync(&self) -> Option<u32> {
        self.barrier.pending()
    }

    pub fn eager_bind(&self) -> bool {
        self.eager_bind
    }

    /// Bind every announced global right away (on by default).
    pub fn set_eager_bind(&mut self, eager: bool) {
        self.eager_bind = eager;
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn binder(&self) -> &Binder {
        &self.binder
    }

    /// Ask the server to confirm it processed everything sent so far.
    ///
    /// A newer sync supersedes one still pending.
    pub fn sync(&mut self) -> Result<u32, ConnectionError> {
        let seq = self.barrier.peek();
        self.channel.send(Request::Sync { id: ID_CORE, seq })?;
        self.barrier.commit(seq);
        Ok(seq)
    }

    /// Bind a proxy to global `id`.
    pub fn bind(&mut self, id: u32) -> Result<ProxyId, ConnectionError> {
        self.ensure_connected()?;
        let global = self.watcher.globals().get(id).ok_or(ConnectionError::UnknownGlobal(id))?;
        if let Some(proxy) = global.proxy() {
            return Err(ConnectionError::AlreadyBound { id, proxy });
        }
        let spec = *self.binder.lookup(&global.type_tag)?;
        let type_tag = global.type_tag.clone();

        let channel = &mut self.channel;
        let slot = self.proxies.try_insert_with(|slot| {
            channel.send(Request::Bind {
                global: id,
                type_tag,
                version: spec.version,
                new_id: ProxyId(slot),
            })?;
            Ok::<_, ConnectionError>(Proxy {
                id: ProxyId(slot),
                role: ProxyRole::Object,
                object_type: spec.object_type,
                version: spec.version,
                events: spec.events,
                global: Some(id),
                sink: (spec.new_sink)(),
            })
        })?;

        let proxy = ProxyId(slot);
        if let Some(global) = self.watcher.globals_mut().get_mut(id) {
            global.proxy = Some(proxy);
        }
        debug!("remote {} bound global {} to proxy {}", self.remote_id, id, proxy);
        Ok(proxy)
    }

    /// Ask `factory` to create an object of type `object_type`.
    ///
    /// The returned proxy is linked to its global once the first info
    /// reports the server id.
    pub fn create_object(
        &mut self,
        factory: &str,
        object_type: ObjectType,
        props: Properties,
    ) -> Result<ProxyId, ConnectionError> {
        self.ensure_connected()?;
        let spec = *self.binder.lookup(object_type.type_tag())?;

        let channel = &mut self.channel;
        let slot = self.proxies.try_insert_with(|slot| {
            channel.send(Request::CreateObject {
                factory: factory.to_string(),
                type_tag: spec.type_tag().to_string(),
                version: spec.version,
                props,
                new_id: ProxyId(slot),
            })?;
            Ok::<_, ConnectionError>(Proxy {
                id: ProxyId(slot),
                role: ProxyRole::Object,
                object_type: spec.object_type,
                version: spec.version,
                events: spec.events,
                global: None,
                sink: (spec.new_sink)(),
            })
        })?;
        debug!(
            "remote {} created {} proxy {} with factory {}",
            self.remote_id, object_type, slot, factory
        );
        Ok(ProxyId(slot))
    }

    /// Ask the registry to destroy global `id`.
    pub fn destroy_global(&mut self, id: u32) -> Result<(), ConnectionError> {
        self.ensure_connected()?;
        if !self.watcher.globals().contains(id) {
            return Err(ConnectionError::UnknownGlobal(id));
        }
        self.channel.send(Request::Destroy { global: id })?;
        Ok(())
    }

    /// Enumerate params `param_id` of global `id`, binding it first if needed.
    pub fn enum_params(&mut self, id: u32, param_id: u32) -> Result<i32, ConnectionError> {
        let proxy = self.bound_proxy(id)?;
        self.require_events(id, proxy, EventMask::PARAM, "enum-params")?;
        let seq = self.param_seq;
        self.channel.send(Request::EnumParams {
            proxy,
            seq,
            id: param_id,
            index: 0,
            num: 0,
        })?;
        self.param_seq = self.param_seq.wrapping_add(1);
        Ok(seq)
    }

    pub fn update_permissions(
        &mut self,
        id: u32,
        permissions: Vec<Permission>,
    ) -> Result<(), ConnectionError> {
        let proxy = self.typed_proxy(id, ObjectType::Client)?;
        self.channel.send(Request::UpdatePermissions { proxy, permissions })?;
        Ok(())
    }

    pub fn get_permissions(&mut self, id: u32) -> Result<(), ConnectionError> {
        let proxy = self.typed_proxy(id, ObjectType::Client)?;
        self.channel.send(Request::GetPermissions {
            proxy,
            index: 0,
            num: u32::MAX,
        })?;
        Ok(())
    }

    /// Set (or with `value == None`, remove) a key on metadata object `id`.
    pub fn set_metadata_property(
        &mut self,
        id: u32,
        subject: u32,
        key: &str,
        type_: Option<&str>,
        value: Option<&str>,
    ) -> Result<(), ConnectionError> {
        let proxy = self.typed_proxy(id, ObjectType::Metadata)?;
        self.channel.send(Request::SetMetadataProperty {
            proxy,
            subject,
            key: key.to_string(),
            type_: type_.map(str::to_string),
            value: value.map(str::to_string),
        })?;
        Ok(())
    }

    /// Describe global `id` now if its info is cached, otherwise bind it and
    /// report once the first info arrives.
    pub fn request_info(&mut self, id: u32) -> Result<InfoRequest, ConnectionError> {
        let proxy = self.bound_proxy(id)?;
        let cached = self
            .proxies
            .get(proxy.0)
            .map_or(false, |p| p.sink.info().is_some());
        if cached {
            return self.describe(id).map(InfoRequest::Ready);
        }
        if let Some(global) = self.watcher.globals_mut().get_mut(id) {
            global.info_pending = true;
        }
        Ok(InfoRequest::Pending)
    }

    /// Render global `id` and its cached info, then clear the change mask.
    pub fn describe(&mut self, id: u32) -> Result<String, ConnectionError> {
        let global = self.watcher.globals().get(id).ok_or(ConnectionError::UnknownGlobal(id))?;
        let mut out = String::new();
        let _ = writeln!(out, "\tid: {}", global.id);
        let _ = writeln!(out, "\tpermissions: {}", global.permissions);
        let _ = writeln!(out, "\ttype: {}/{}", global.type_tag, global.version);
        if let Some(proxy) = global.proxy().and_then(|p| self.proxies.get_mut(p.0)) {
            let _ = proxy.sink.describe(&mut out);
            proxy.sink.clear_change_mask();
        }
        Ok(out)
    }

    /// Apply one inbound event.
    ///
    /// `Err(Fatal)` means the core reported an error on itself; the caller is
    /// expected to tear the connection down.
    pub fn handle_event(&mut self, event: Event) -> Result<Vec<Notification>, ConnectionError> {
        self.ensure_connected()?;
        match event {
            Event::Global {
                id,
                permissions,
                type_tag,
                version,
                props,
            } => self.on_global(Global::new(id, permissions, type_tag, version, props)),
            Event::GlobalRemoved { id } => self.on_global_removed(id),
            Event::Info { proxy, info } => Ok(self.on_info(proxy, &info)),
            Event::Param {
                proxy,
                seq,
                id,
                index,
                next,
                param,
            } => Ok(self
                .accepting(proxy, EventMask::PARAM, "param")
                .map(|global| Notification::Param {
                    global,
                    proxy,
                    seq,
                    id,
                    index,
                    next,
                    param,
                })
                .into_iter()
                .collect()),
            Event::Permissions {
                proxy,
                index,
                permissions,
            } => Ok(self
                .accepting(proxy, EventMask::PERMISSIONS, "permissions")
                .map(|global| Notification::Permissions {
                    global,
                    proxy,
                    index,
                    permissions,
                })
                .into_iter()
                .collect()),
            Event::MetadataProperty {
                proxy,
                subject,
                key,
                type_,
                value,
            } => Ok(self.on_metadata_property(proxy, subject, key, type_, value)),
            Event::Done { id, seq } => Ok(self.on_done(id, seq)),
            Event::Error {
                id,
                seq,
                res,
                message,
            } => self.on_error(id, seq, res, message),
            Event::ProxyDestroyed { proxy } => Ok(self.destroy_proxy(proxy, false).into_iter().collect()),
        }
    }

    /// Destroy every proxy, forget every global and close the channel.
    pub fn teardown(&mut self) -> Vec<Notification> {
        let mut notifications = Vec::new();
        for (slot, proxy) in self.proxies.drain() {
            if proxy.role == ProxyRole::Object {
                notifications.push(Notification::ProxyDestroyed {
                    proxy: ProxyId(slot),
                    global: proxy.global,
                });
            }
        }
        let forgotten = self.watcher.disconnect();
        self.barrier.reset();
        if let Err(err) = self.channel.send(Request::Disconnect) {
            debug!("remote {} disconnect not sent: {}", self.remote_id, err);
        }
        info!(
            "remote {} disconnected, dropped {} globals",
            self.remote_id,
            forgotten.len()
        );
        notifications
    }

    fn on_global(&mut self, global: Global) -> Result<Vec<Notification>, ConnectionError> {
        let id = global.id;
        debug!(
            "remote {} global {} {}/{}",
            self.remote_id, id, global.type_tag, global.version
        );
        let mut notifications = Vec::new();
        if let Some(previous) = self.watcher.on_global(global)? {
            if let Some(proxy) = previous.proxy() {
                notifications.extend(self.destroy_proxy(proxy, true));
            }
        }
        if let Some(global) = self.watcher.globals().get(id) {
            notifications.push(Notification::GlobalAdded(global.clone()));
        }

        let unbound = self.global(id).map_or(false, |g| !g.is_bound());
        if self.eager_bind && unbound {
            match self.bind(id) {
                Ok(proxy) => notifications.push(Notification::Bound { id, proxy }),
                Err(err) => {
                    warn!("remote {} could not bind global {}: {}", self.remote_id, id, err);
                    notifications.push(Notification::BindFailed {
                        id,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(notifications)
    }

    fn on_global_removed(&mut self, id: u32) -> Result<Vec<Notification>, ConnectionError> {
        let Some(mut global) = self.watcher.on_global_removed(id)? else {
            warn!("remote {} removed unknown global {}", self.remote_id, id);
            return Ok(vec![Notification::UnknownGlobalRemoved { id }]);
        };
        let mut notifications = Vec::new();
        if let Some(proxy) = global.proxy.take() {
            notifications.extend(self.destroy_proxy(proxy, true));
        }
        global.info_pending = false;
        notifications.push(Notification::GlobalRemoved(global));
        Ok(notifications)
    }

    fn on_info(&mut self, proxy_id: ProxyId, update: &InfoUpdate) -> Vec<Notification> {
        let remote_id = self.remote_id;
        let Some(proxy) = self.proxies.get_mut(proxy_id.0) else {
            debug!("remote {} info for unknown proxy {}", remote_id, proxy_id);
            return Vec::new();
        };
        if !proxy.events.contains(EventMask::INFO) {
            debug!("remote {} proxy {} takes no info events", remote_id, proxy_id);
            return Vec::new();
        }
        if proxy.global.map_or(false, |global| global != update.id()) {
            debug!(
                "remote {} proxy {} dropped info for object {}",
                remote_id,
                proxy_id,
                update.id()
            );
            return Vec::new();
        }
        let applied = match proxy.sink.apply(update) {
            Ok(applied) => applied,
            Err(err) => {
                warn!("remote {} proxy {}: {}", remote_id, proxy_id, err);
                return Vec::new();
            }
        };

        let mut notifications = Vec::new();
        if proxy.role == ProxyRole::Core {
            if applied.first {
                if let Some(InfoRef::Core(core)) = proxy.sink.info() {
                    info!("remote {} is named '{}'", remote_id, core.name);
                    self.name = Some(core.name.clone());
                    notifications.push(Notification::RemoteNamed {
                        name: core.name.clone(),
                    });
                }
            } else {
                notifications.push(Notification::InfoChanged {
                    id: applied.id,
                    proxy: proxy_id,
                    object_type: ObjectType::Core,
                });
            }
            return notifications;
        }

        if !applied.first {
            notifications.push(Notification::InfoChanged {
                id: applied.id,
                proxy: proxy_id,
                object_type: proxy.object_type,
            });
        }
        if proxy.global.is_none() && self.watcher.globals().contains(applied.id) {
            proxy.global = Some(applied.id);
        }
        if let Some(global) = proxy
            .global
            .and_then(|id| self.watcher.globals_mut().get_mut(id))
        {
            if global.info_pending && global.proxy == Some(proxy_id) {
                global.info_pending = false;
                notifications.push(Notification::InfoReady {
                    id: global.id,
                    proxy: proxy_id,
                });
            }
        }
        notifications
    }

    fn on_metadata_property(
        &mut self,
        proxy_id: ProxyId,
        subject: u32,
        key: Option<String>,
        type_: Option<String>,
        value: Option<String>,
    ) -> Vec<Notification> {
        let Some(global) = self.accepting(proxy_id, EventMask::PROPERTY, "property") else {
            return Vec::new();
        };
        if let Some(proxy) = self.proxies.get_mut(proxy_id.0) {
            if let Err(err) =
                proxy
                    .sink
                    .apply_property(subject, key.as_deref(), type_.as_deref(), value.as_deref())
            {
                warn!("remote {} proxy {}: {}", self.remote_id, proxy_id, err);
                return Vec::new();
            }
        }
        vec![Notification::MetadataProperty {
            global,
            proxy: proxy_id,
            subject,
            key,
            type_,
            value,
        }]
    }

    fn on_done(&mut self, id: u32, seq: u32) -> Vec<Notification> {
        if id != ID_CORE {
            debug!("remote {} done for object {} ignored", self.remote_id, id);
            return Vec::new();
        }
        self.watcher.on_done(seq);
        match self.barrier.complete(seq) {
            SyncOutcome::Resolved => vec![Notification::SyncDone { seq }],
            SyncOutcome::Stale { .. } | SyncOutcome::Idle => Vec::new(),
        }
    }

    fn on_error(
        &mut self,
        id: u32,
        seq: i32,
        res: i32,
        message: String,
    ) -> Result<Vec<Notification>, ConnectionError> {
        error!(
            "remote {} error id:{} seq:{} res:{}: {}",
            self.remote_id, id, seq, res, message
        );
        if id == ID_CORE {
            return Err(ConnectionError::Fatal { seq, res, message });
        }
        Ok(vec![Notification::ObjectError {
            id,
            seq,
            res,
            message,
        }])
    }

    /// The proxy's global id if it exists and accepts `event`.
    ///
    /// The outer `Option` is `None` when the event must be dropped.
    fn accepting(&self, proxy_id: ProxyId, mask: EventMask, event: &str) -> Option<Option<u32>> {
        match self.proxies.get(proxy_id.0) {
            Some(proxy) if proxy.events.contains(mask) => Some(proxy.global),
            Some(proxy) => {
                debug!(
                    "remote {} {} proxy {} takes no {} events",
                    self.remote_id, proxy.object_type, proxy_id, event
                );
                None
            }
            None => {
                debug!("remote {} {} for unknown proxy {}", self.remote_id, event, proxy_id);
                None
            }
        }
    }

    /// Remove a proxy and unlink it from its global. Runs once per proxy.
    ///
    /// With `notify_server` the slot stays taken by a placeholder until the
    /// server's `proxy_destroyed` arrives; events for the old object land on
    /// the placeholder and are dropped.
    fn destroy_proxy(&mut self, proxy_id: ProxyId, notify_server: bool) -> Option<Notification> {
        let (role, object_type) = self
            .proxies
            .get(proxy_id.0)
            .map(|proxy| (proxy.role, proxy.object_type))?;
        match role {
            ProxyRole::Object => {}
            ProxyRole::Destroying => {
                if !notify_server {
                    self.proxies.remove(proxy_id.0);
                    debug!("remote {} released proxy id {}", self.remote_id, proxy_id);
                }
                return None;
            }
            ProxyRole::Core | ProxyRole::Registry => {
                debug!("remote {} keeps reserved proxy {}", self.remote_id, proxy_id);
                return None;
            }
        }

        let awaiting_echo = notify_server
            && match self.channel.send(Request::DestroyProxy { proxy: proxy_id }) {
                Ok(()) => true,
                Err(err) => {
                    warn!("remote {} could not destroy proxy {}: {}", self.remote_id, proxy_id, err);
                    false
                }
            };
        let proxy = if awaiting_echo {
            self.proxies
                .insert_at(proxy_id.0, Proxy::destroying(proxy_id, object_type))?
        } else {
            self.proxies.remove(proxy_id.0)?
        };
        if let Some(global) = proxy
            .global
            .and_then(|id| self.watcher.globals_mut().get_mut(id))
        {
            if global.proxy == Some(proxy_id) {
                global.proxy = None;
                global.info_pending = false;
            }
        }
        debug!(
            "remote {} destroyed {} proxy {}",
            self.remote_id, proxy.object_type, proxy_id
        );
        Some(Notification::ProxyDestroyed {
            proxy: proxy_id,
            global: proxy.global,
        })
    }

    /// Proxy bound to global `id`, binding one if needed.
    fn bound_proxy(&mut self, id: u32) -> Result<ProxyId, ConnectionError> {
        self.ensure_connected()?;
        let global = self.watcher.globals().get(id).ok_or(ConnectionError::UnknownGlobal(id))?;
        match global.proxy() {
            Some(proxy) => Ok(proxy),
            None => self.bind(id),
        }
    }

    fn typed_proxy(&mut self, id: u32, expected: ObjectType) -> Result<ProxyId, ConnectionError> {
        self.ensure_connected()?;
        let global = self.watcher.globals().get(id).ok_or(ConnectionError::UnknownGlobal(id))?;
        if !global.is_type(expected) {
            return Err(ConnectionError::WrongType { id, expected });
        }
        self.bound_proxy(id)
    }

    fn require_events(
        &self,
        id: u32,
        proxy: ProxyId,
        mask: EventMask,
        operation: &'static str,
    ) -> Result<(), ConnectionError> {
        match self.proxies.get(proxy.0) {
            Some(p) if p.events.contains(mask) => Ok(()),
            _ => Err(ConnectionError::NotImplemented {
                operation,
                id,
                type_tag: self
                    .global(id)
                    .map(|g| g.type_tag.clone())
                    .unwrap_or_default(),
            }),
        }
    }

    fn ensure_connected(&self) -> Result<(), ConnectionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{NodeChange, NodeInfo};
    use crate::props::keys;
    use crate::protocol::RecordingChannel;
    use crate::types::Permissions;

    fn connect() -> (Connection<RecordingChannel>, RecordingChannel) {
        let recorder = RecordingChannel::new();
        let conn = Connection::connect(0, recorder.clone(), Arc::new(Binder::standard())).unwrap();
        (conn, recorder)
    }

    fn global_event(id: u32, ty: &str) -> Event {
        Event::Global {
            id,
            permissions: Permissions::R | Permissions::X,
            type_tag: ty.to_string(),
            version: 3,
            props: Properties::new(),
        }
    }

    #[test]
    fn test_connect_requests_registry_then_sync() {
        let (conn, recorder) = connect();
        assert_eq!(
            recorder.requests(),
            vec![
                Request::GetRegistry {
                    new_id: ProxyId::REGISTRY,
                    version: REGISTRY_VERSION
                },
                Request::Sync { id: 0, seq: 0 },
            ]
        );
        assert_eq!(conn.state(), WatchState::Subscribing);
        assert_eq!(conn.pending_sync(), Some(0));
        assert_eq!(conn.proxies().count(), 2);
    }

    #[test]
    fn test_connect_fails_on_closed_channel() {
        let recorder = RecordingChannel::new();
        recorder.close();
        let err = Connection::connect(0, recorder, Arc::new(Binder::standard())).unwrap_err();
        assert_eq!(err, ConnectionError::Channel(ChannelError::Closed));
    }

    #[test]
    fn test_initial_done_starts_watching() {
        let (mut conn, _) = connect();
        let notes = conn.handle_event(Event::Done { id: 0, seq: 0 }).unwrap();
        assert_eq!(notes, vec![Notification::SyncDone { seq: 0 }]);
        assert_eq!(conn.state(), WatchState::Watching);
    }

    #[test]
    fn test_eager_bind_on_global() {
        let (mut conn, recorder) = connect();
        recorder.take();
        let notes = conn
            .handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        assert!(matches!(notes[0], Notification::GlobalAdded(ref g) if g.id == 3));
        assert_eq!(
            notes[1],
            Notification::Bound {
                id: 3,
                proxy: ProxyId(2)
            }
        );
        assert_eq!(
            recorder.requests(),
            vec![Request::Bind {
                global: 3,
                type_tag: ObjectType::Node.type_tag().to_string(),
                version: 3,
                new_id: ProxyId(2),
            }]
        );
        assert_eq!(conn.global(3).unwrap().proxy(), Some(ProxyId(2)));
    }

    #[test]
    fn test_lazy_bind_when_disabled() {
        let (mut conn, _) = connect();
        conn.set_eager_bind(false);
        let notes = conn
            .handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert!(!conn.global(3).unwrap().is_bound());
        assert_eq!(conn.bind(3).unwrap(), ProxyId(2));
    }

    #[test]
    fn test_bind_twice_rejected() {
        let (mut conn, _) = connect();
        conn.handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        assert_eq!(
            conn.bind(3),
            Err(ConnectionError::AlreadyBound {
                id: 3,
                proxy: ProxyId(2)
            })
        );
    }

    #[test]
    fn test_unsupported_type_is_not_fatal() {
        let (mut conn, recorder) = connect();
        recorder.take();
        let notes = conn.handle_event(global_event(8, "unknown.type/1")).unwrap();
        assert!(matches!(
            &notes[1],
            Notification::BindFailed { id: 8, error } if error.contains("unsupported type")
        ));
        assert_eq!(conn.proxies().count(), 2);
        assert!(recorder.requests().is_empty());
        assert!(!conn.global(8).unwrap().is_bound());
    }

    #[test]
    fn test_info_caches_and_reports_changes() {
        let (mut conn, _) = connect();
        conn.handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        let update = InfoUpdate::Node(NodeInfo {
            id: 3,
            change_mask: NodeChange::PROPS,
            props: Properties::from([(keys::MEDIA_CLASS, "Audio/Sink")]),
            ..NodeInfo::default()
        });
        let first = conn
            .handle_event(Event::Info {
                proxy: ProxyId(2),
                info: update.clone(),
            })
            .unwrap();
        assert!(first.is_empty());

        let again = conn
            .handle_event(Event::Info {
                proxy: ProxyId(2),
                info: update,
            })
            .unwrap();
        assert_eq!(
            again,
            vec![Notification::InfoChanged {
                id: 3,
                proxy: ProxyId(2),
                object_type: ObjectType::Node
            }]
        );
        let info = conn.info_as::<NodeInfo>(3).unwrap();
        assert_eq!(info.props.get(keys::MEDIA_CLASS), Some("Audio/Sink"));
    }

    #[test]
    fn test_core_info_names_remote() {
        let (mut conn, _) = connect();
        let core_info = Event::Info {
            proxy: ProxyId::CORE,
            info: InfoUpdate::Core(CoreInfo {
                name: "pipewire-0".into(),
                ..CoreInfo::default()
            }),
        };
        let notes = conn.handle_event(core_info.clone()).unwrap();
        assert_eq!(
            notes,
            vec![Notification::RemoteNamed {
                name: "pipewire-0".into()
            }]
        );
        assert_eq!(conn.name(), Some("pipewire-0"));

        // later core updates report a change, not a new name
        let notes = conn.handle_event(core_info).unwrap();
        assert_eq!(
            notes,
            vec![Notification::InfoChanged {
                id: ID_CORE,
                proxy: ProxyId::CORE,
                object_type: ObjectType::Core,
            }]
        );
    }

    #[test]
    fn test_request_info_waits_for_first_info() {
        let (mut conn, _) = connect();
        conn.set_eager_bind(false);
        conn.handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        assert_eq!(conn.request_info(3).unwrap(), InfoRequest::Pending);
        assert!(conn.global(3).unwrap().info_pending());

        let notes = conn
            .handle_event(Event::Info {
                proxy: ProxyId(2),
                info: InfoUpdate::Node(NodeInfo {
                    id: 3,
                    change_mask: NodeChange::STATE,
                    ..NodeInfo::default()
                }),
            })
            .unwrap();
        assert_eq!(
            notes,
            vec![Notification::InfoReady {
                id: 3,
                proxy: ProxyId(2)
            }]
        );
        let text = conn.describe(3).unwrap();
        assert!(text.starts_with("\tid: 3\n\tpermissions: r-x\n\ttype: PipeWire:Interface:Node/3\n"));
        assert!(text.contains("*\tstate: \"creating\"\n"));

        match conn.request_info(3).unwrap() {
            InfoRequest::Ready(text) => assert!(text.contains(" \tstate: \"creating\"\n")),
            other => panic!("expected cached info, got {:?}", other),
        }
    }

    #[test]
    fn test_remove_destroys_proxy_once() {
        let (mut conn, recorder) = connect();
        conn.handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        recorder.take();

        let notes = conn.handle_event(Event::GlobalRemoved { id: 3 }).unwrap();
        assert_eq!(
            notes[0],
            Notification::ProxyDestroyed {
                proxy: ProxyId(2),
                global: Some(3)
            }
        );
        assert!(matches!(notes[1], Notification::GlobalRemoved(ref g) if g.id == 3));
        assert_eq!(
            recorder.requests(),
            vec![Request::DestroyProxy { proxy: ProxyId(2) }]
        );
        assert!(conn.global(3).is_none());
        assert!(conn.proxy(ProxyId(2)).is_none());

        // the server echoing the destruction is a no-op
        let echoed = conn
            .handle_event(Event::ProxyDestroyed { proxy: ProxyId(2) })
            .unwrap();
        assert!(echoed.is_empty());
    }

    #[test]
    fn test_destroyed_slot_held_until_echo() {
        let (mut conn, _) = connect();
        conn.handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        conn.handle_event(Event::GlobalRemoved { id: 3 }).unwrap();
        assert!(conn.proxy(ProxyId(2)).is_none());
        assert_eq!(conn.proxies().count(), 2);

        conn.handle_event(global_event(4, ObjectType::Node.type_tag()))
            .unwrap();
        assert_eq!(conn.global(4).unwrap().proxy(), Some(ProxyId(3)));

        // a stale info for the old object never reaches the new proxy
        let notes = conn
            .handle_event(Event::Info {
                proxy: ProxyId(3),
                info: InfoUpdate::Node(NodeInfo {
                    id: 3,
                    ..NodeInfo::default()
                }),
            })
            .unwrap();
        assert!(notes.is_empty());
        assert!(conn.info(4).is_none());

        let echoed = conn
            .handle_event(Event::ProxyDestroyed { proxy: ProxyId(2) })
            .unwrap();
        assert!(echoed.is_empty());
        assert_eq!(conn.global(4).unwrap().proxy(), Some(ProxyId(3)));
        assert_eq!(conn.proxies.next_id(), 2);
    }

    #[test]
    fn test_huge_global_id_is_refused() {
        let (mut conn, recorder) = connect();
        recorder.take();
        let err = conn
            .handle_event(global_event(u32::MAX - 1, ObjectType::Node.type_tag()))
            .unwrap_err();
        assert_eq!(err, ConnectionError::GlobalIdOutOfRange(u32::MAX - 1));
        assert!(conn.globals().is_empty());
        assert!(recorder.requests().is_empty());
    }

    #[test]
    fn test_remove_unknown_global() {
        let (mut conn, _) = connect();
        let notes = conn.handle_event(Event::GlobalRemoved { id: 42 }).unwrap();
        assert_eq!(notes, vec![Notification::UnknownGlobalRemoved { id: 42 }]);
    }

    #[test]
    fn test_core_error_is_fatal() {
        let (mut conn, _) = connect();
        let err = conn
            .handle_event(Event::Error {
                id: 0,
                seq: 3,
                res: -32,
                message: "connection lost".into(),
            })
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Fatal { res: -32, .. }));

        let notes = conn
            .handle_event(Event::Error {
                id: 7,
                seq: 3,
                res: -2,
                message: "no such object".into(),
            })
            .unwrap();
        assert!(matches!(notes[0], Notification::ObjectError { id: 7, .. }));
    }

    #[test]
    fn test_enum_params_requires_param_events() {
        let (mut conn, recorder) = connect();
        conn.handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        conn.handle_event(global_event(4, ObjectType::Client.type_tag()))
            .unwrap();
        recorder.take();

        assert_eq!(conn.enum_params(3, 3).unwrap(), 0);
        assert_eq!(
            recorder.requests(),
            vec![Request::EnumParams {
                proxy: ProxyId(2),
                seq: 0,
                id: 3,
                index: 0,
                num: 0
            }]
        );
        let err = conn.enum_params(4, 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "enum-params not implemented on object 4 type:PipeWire:Interface:Client"
        );
    }

    #[test]
    fn test_permissions_need_a_client() {
        let (mut conn, _) = connect();
        conn.handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        let err = conn.get_permissions(3).unwrap_err();
        assert_eq!(err.to_string(), "object 3 is not a client");
        assert_eq!(conn.get_permissions(9), Err(ConnectionError::UnknownGlobal(9)));
    }

    #[test]
    fn test_created_proxy_links_global_lazily() {
        let (mut conn, _) = connect();
        conn.set_eager_bind(false);
        let proxy = conn
            .create_object("adapter", ObjectType::Node, Properties::new())
            .unwrap();
        assert_eq!(conn.proxy(proxy).unwrap().global(), None);

        // info can beat the global announcement
        conn.handle_event(Event::Info {
            proxy,
            info: InfoUpdate::Node(NodeInfo {
                id: 12,
                ..NodeInfo::default()
            }),
        })
        .unwrap();
        assert_eq!(conn.proxy(proxy).unwrap().global(), None);
        assert!(conn.proxy(proxy).unwrap().info().is_some());

        conn.handle_event(global_event(12, ObjectType::Node.type_tag()))
            .unwrap();
        conn.handle_event(Event::Info {
            proxy,
            info: InfoUpdate::Node(NodeInfo {
                id: 12,
                ..NodeInfo::default()
            }),
        })
        .unwrap();
        assert_eq!(conn.proxy(proxy).unwrap().global(), Some(12));
    }

    #[test]
    fn test_teardown() {
        let (mut conn, recorder) = connect();
        conn.handle_event(global_event(3, ObjectType::Node.type_tag()))
            .unwrap();
        recorder.take();

        let notes = conn.teardown();
        assert_eq!(
            notes,
            vec![Notification::ProxyDestroyed {
                proxy: ProxyId(2),
                global: Some(3)
            }]
        );
        assert_eq!(recorder.requests(), vec![Request::Disconnect]);
        assert!(conn.globals().is_empty());
        assert_eq!(conn.proxies().count(), 0);
        assert_eq!(
            conn.handle_event(Event::Done { id: 0, seq: 0 }),
            Err(ConnectionError::NotConnected)
        );
    }
}
