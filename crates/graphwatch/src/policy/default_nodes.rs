//! Remembers the configured default devices across restarts
//!
//! The policy watches the `default` metadata object of a connection. When a
//! configured default changes it records the node *name* (ids are not stable
//! across restarts) and saves the table after an idle interval. When a node
//! with a remembered name appears again, the default is restored by writing
//! its new id back into the metadata.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionError, Notification};
use crate::global::Global;
use crate::props::{keys, Properties};
use crate::protocol::Channel;
use crate::types::{ObjectType, ID_CORE};

/// Metadata keys whose values are remembered.
pub const DEFAULT_KEYS: [&str; 3] = [
    "default.configured.audio.sink",
    "default.configured.audio.source",
    "default.configured.video.source",
];

/// Value of `metadata.name` on the metadata object holding defaults.
pub const DEFAULT_METADATA_NAME: &str = "default";

/// File name of the saved table inside the state directory.
pub const STATE_FILE: &str = "default-nodes";

/// Metadata type of an object id value.
const ID_TYPE: &str = "Spa:Id";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON file holding the remembered defaults.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<state_dir>/default-nodes`.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved table; a missing file is an empty table.
    pub fn load(&self) -> Result<Properties, StateError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Properties::new()),
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, state: &Properties) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(state).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, text).map_err(io_err)
    }
}

#[derive(Debug, Deserialize)]
struct Remembered {
    name: String,
}

#[derive(Debug, Clone, Copy)]
struct DefaultNode {
    key: &'static str,
    value: Option<u32>,
}

#[derive(Debug)]
pub struct DefaultNodes {
    defaults: [DefaultNode; 3],
    state: Properties,
    store: StateStore,
    save_interval: Duration,
    save_at: Option<Instant>,
    metadata: Option<u32>,
}

impl DefaultNodes {
    /// Start from whatever `store` holds. An unreadable file is logged and
    /// treated as empty.
    pub fn new(store: StateStore, save_interval: Duration) -> Self {
        let state = match store.load() {
            Ok(state) => state,
            Err(err) => {
                warn!("can't load default-nodes state: {}", err);
                Properties::new()
            }
        };
        Self {
            defaults: DEFAULT_KEYS.map(|key| DefaultNode { key, value: None }),
            state,
            store,
            save_interval,
            save_at: None,
            metadata: None,
        }
    }

    /// Remembered `key -> {"name": ...}` table.
    pub fn state(&self) -> &Properties {
        &self.state
    }

    /// Node id currently configured for `key`.
    pub fn current(&self, key: &str) -> Option<u32> {
        self.defaults
            .iter()
            .find(|def| def.key == key)
            .and_then(|def| def.value)
    }

    /// Global id of the metadata object being watched.
    pub fn metadata(&self) -> Option<u32> {
        self.metadata
    }

    pub fn save_pending(&self) -> bool {
        self.save_at.is_some()
    }

    pub fn on_notification<C: Channel>(
        &mut self,
        conn: &mut Connection<C>,
        notification: &Notification,
        now: Instant,
    ) -> Result<(), ConnectionError> {
        match notification {
            Notification::GlobalAdded(global) if global.is_type(ObjectType::Metadata) => {
                if is_default_metadata(global) && self.metadata.is_none() {
                    debug!("watching defaults on metadata {}", global.id);
                    self.metadata = Some(global.id);
                    return self.restore_all(conn);
                }
                Ok(())
            }
            Notification::GlobalAdded(global) if global.is_type(ObjectType::Node) => {
                self.restore(conn, global)
            }
            Notification::GlobalRemoved(global) if global.is_type(ObjectType::Node) => {
                self.forget(conn, global.id)
            }
            Notification::GlobalRemoved(global) if Some(global.id) == self.metadata => {
                self.metadata = None;
                Ok(())
            }
            Notification::MetadataProperty {
                global: Some(id),
                subject,
                key,
                value,
                ..
            } if Some(*id) == self.metadata && *subject == ID_CORE => {
                self.on_property(conn, key.as_deref(), value.as_deref(), now);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Save if the idle interval since the last change elapsed.
    ///
    /// Returns true when the state was written.
    pub fn poll_save(&mut self, now: Instant) -> Result<bool, StateError> {
        match self.save_at {
            Some(deadline) if now >= deadline => {
                self.flush()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Write any pending change right away.
    pub fn flush(&mut self) -> Result<(), StateError> {
        if self.save_at.is_some() {
            self.store.save(&self.state)?;
            self.save_at = None;
            debug!("saved default-nodes state to {}", self.store.path().display());
        }
        Ok(())
    }

    fn on_property<C: Channel>(
        &mut self,
        conn: &Connection<C>,
        key: Option<&str>,
        value: Option<&str>,
        now: Instant,
    ) {
        let new_value = match (key, value) {
            (Some(_), Some(value)) => value.trim().parse::<u32>().ok(),
            _ => None,
        };
        let mut changed = false;
        for def in self.defaults.iter_mut() {
            if key.map_or(true, |key| key == def.key) && def.value != new_value {
                def.value = new_value;
                changed = true;
            }
        }
        if !changed {
            return;
        }

        match key {
            None => self.state.clear(),
            Some(key) => match new_value.and_then(|id| node_name(conn, id)) {
                Some(name) => {
                    self.state
                        .set(key, serde_json::json!({ "name": name }).to_string());
                }
                None => {
                    self.state.remove(key);
                }
            },
        }
        self.save_at = Some(now + self.save_interval);
    }

    fn restore_all<C: Channel>(&mut self, conn: &mut Connection<C>) -> Result<(), ConnectionError> {
        let nodes: Vec<Global> = conn
            .globals()
            .iter()
            .filter(|g| g.is_type(ObjectType::Node))
            .cloned()
            .collect();
        for node in &nodes {
            self.restore(conn, node)?;
        }
        Ok(())
    }

    fn restore<C: Channel>(
        &self,
        conn: &mut Connection<C>,
        node: &Global,
    ) -> Result<(), ConnectionError> {
        let Some(metadata) = self.metadata else {
            return Ok(());
        };
        let Some(name) = node.props.get(keys::NODE_NAME) else {
            return Ok(());
        };
        for (key, value) in self.state.iter() {
            if !DEFAULT_KEYS.contains(&key) {
                continue;
            }
            let remembered: Remembered = match serde_json::from_str(value) {
                Ok(remembered) => remembered,
                Err(err) => {
                    debug!("skipping {}: {}", key, err);
                    continue;
                }
            };
            if remembered.name == name {
                info!("found {} with id:{} restore as {}", name, node.id, key);
                conn.set_metadata_property(
                    metadata,
                    ID_CORE,
                    key,
                    Some(ID_TYPE),
                    Some(&node.id.to_string()),
                )?;
            }
        }
        Ok(())
    }

    fn forget<C: Channel>(&mut self, conn: &mut Connection<C>, id: u32) -> Result<(), ConnectionError> {
        for def in self.defaults.iter_mut() {
            if def.value == Some(id) {
                def.value = None;
                if let Some(metadata) = self.metadata {
                    conn.set_metadata_property(metadata, ID_CORE, def.key, None, None)?;
                }
            }
        }
        Ok(())
    }
}

fn is_default_metadata(global: &Global) -> bool {
    global
        .props
        .get(keys::METADATA_NAME)
        .map_or(true, |name| name == DEFAULT_METADATA_NAME)
}

fn node_name<C: Channel>(conn: &Connection<C>, id: u32) -> Option<String> {
    let global = conn.global(id)?;
    if !global.is_type(ObjectType::Node) {
        return None;
    }
    global.props.get(keys::NODE_NAME).map(str::to_string)
}
