//! Registry subscription: keeps the global table in step with announcements.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::global::{Global, GlobalTable};

/// Global ids at or above this are refused. The table is indexed by id, so
/// an id sets its size.
pub const GLOBAL_ID_LIMIT: u32 = 1 << 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("not connected")]
    NotConnected,

    #[error("global id {0} out of range")]
    IdOutOfRange(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchState {
    #[default]
    Disconnected,
    /// Registry requested, initial burst of globals still arriving.
    Subscribing,
    /// The server acknowledged the sync sent right after subscribing.
    Watching,
}

#[derive(Debug, Default)]
pub struct RegistryWatcher {
    state: WatchState,
    initial_sync: Option<u32>,
    globals: GlobalTable,
}

impl RegistryWatcher {
    pub fn new() -> Self {
        Self {
            state: WatchState::Disconnected,
            initial_sync: None,
            globals: GlobalTable::new(),
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    pub(crate) fn globals_mut(&mut self) -> &mut GlobalTable {
        &mut self.globals
    }

    /// Registry was requested; `seq` is the sync sent right after it.
    pub fn subscribe(&mut self, seq: u32) {
        self.state = WatchState::Subscribing;
        self.initial_sync = Some(seq);
    }

    /// Returns true when this `done` completed the initial burst.
    pub fn on_done(&mut self, seq: u32) -> bool {
        if self.state == WatchState::Subscribing && self.initial_sync == Some(seq) {
            debug!("initial registry burst complete ({} globals)", self.globals.len());
            self.state = WatchState::Watching;
            self.initial_sync = None;
            return true;
        }
        false
    }

    /// Store a new global, returning the descriptor it replaced.
    ///
    /// A re-announced id keeps its bound proxy as long as the type tag did
    /// not change; otherwise the replaced descriptor still names the old
    /// proxy so the caller can tear it down.
    pub fn on_global(&mut self, mut global: Global) -> Result<Option<Global>, WatchError> {
        self.ensure_connected()?;
        let id = global.id;
        if id >= GLOBAL_ID_LIMIT {
            return Err(WatchError::IdOutOfRange(id));
        }
        if let Some(existing) = self.globals.get(id) {
            warn!(
                "global {} announced again as {}/{}, replacing",
                id, global.type_tag, global.version
            );
            if existing.type_tag == global.type_tag {
                global.proxy = existing.proxy;
                global.info_pending = existing.info_pending;
            }
        }
        let mut previous = self.globals.insert(global);
        if let Some(previous) = previous.as_mut() {
            if self.globals.get(id).and_then(Global::proxy) == previous.proxy {
                previous.proxy = None;
            }
        }
        Ok(previous)
    }

    /// Drop a global. Unknown ids yield `None`.
    pub fn on_global_removed(&mut self, id: u32) -> Result<Option<Global>, WatchError> {
        self.ensure_connected()?;
        Ok(self.globals.remove(id))
    }

    /// Forget every global and stop accepting events.
    pub fn disconnect(&mut self) -> Vec<Global> {
        self.state = WatchState::Disconnected;
        self.initial_sync = None;
        self.globals.drain()
    }

    fn ensure_connected(&self) -> Result<(), WatchError> {
        match self.state {
            WatchState::Disconnected => Err(WatchError::NotConnected),
            _ => Ok(()),
        }
    }
}
