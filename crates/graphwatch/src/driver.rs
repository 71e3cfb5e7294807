//! Runs a [`Session`] on its own tokio task.
//!
//! All mutation goes through one queue, so events and caller closures are
//! applied strictly in the order they were submitted. Notifications come back
//! on an unbounded channel tagged with the remote that produced them.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::connection::Notification;
use crate::protocol::Event;
use crate::session::{Connector, Session, SessionError};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("session driver stopped")]
    Stopped,

    #[error(transparent)]
    Session(#[from] SessionError),
}

type Call<K> = Box<dyn FnOnce(&mut Session<K>) + Send>;

enum Input<K: Connector> {
    Event { remote: u32, event: Event },
    Call(Call<K>),
    Shutdown,
}

/// Cheap, cloneable access to a running session.
pub struct SessionHandle<K: Connector> {
    tx: mpsc::UnboundedSender<Input<K>>,
}

impl<K: Connector> Clone for SessionHandle<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K> SessionHandle<K>
where
    K: Connector + Send + 'static,
{
    /// Queue an inbound event for `remote`.
    pub fn deliver(&self, remote: u32, event: Event) -> Result<(), DriverError> {
        self.tx
            .send(Input::Event { remote, event })
            .map_err(|_| DriverError::Stopped)
    }

    /// Run `f` on the session task and wait for its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, DriverError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Session<K>) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let call: Call<K> = Box::new(move |session| {
            let _ = reply_tx.send(f(session));
        });
        self.tx
            .send(Input::Call(call))
            .map_err(|_| DriverError::Stopped)?;
        reply_rx.await.map_err(|_| DriverError::Stopped)
    }

    /// Close every remote and stop the task once queued input is drained.
    pub fn shutdown(&self) -> Result<(), DriverError> {
        self.tx
            .send(Input::Shutdown)
            .map_err(|_| DriverError::Stopped)
    }
}

/// Spawn the session task.
///
/// The task ends on [`SessionHandle::shutdown`], when every handle is dropped,
/// or with an error after a fatal remote failure.
pub fn spawn<K>(
    session: Session<K>,
) -> (
    SessionHandle<K>,
    mpsc::UnboundedReceiver<(u32, Notification)>,
    JoinHandle<Result<(), DriverError>>,
)
where
    K: Connector + Send + 'static,
    K::Channel: Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(session, rx, notify_tx));
    (SessionHandle { tx }, notify_rx, task)
}

async fn run<K>(
    mut session: Session<K>,
    mut rx: mpsc::UnboundedReceiver<Input<K>>,
    notify: mpsc::UnboundedSender<(u32, Notification)>,
) -> Result<(), DriverError>
where
    K: Connector + Send + 'static,
{
    let forward = |remote: u32, notifications: Vec<Notification>| {
        for notification in notifications {
            if notify.send((remote, notification)).is_err() {
                debug!("notification receiver dropped");
            }
        }
    };

    while let Some(input) = rx.recv().await {
        match input {
            Input::Event { remote, event } => match session.handle_event(remote, event) {
                Ok(notifications) => forward(remote, notifications),
                Err(err @ SessionError::Fatal { .. }) => {
                    error!("stopping session: {}", err);
                    for (remote, notification) in session.shutdown() {
                        forward(remote, vec![notification]);
                    }
                    return Err(err.into());
                }
                Err(err) => warn!("remote {} event dropped: {}", remote, err),
            },
            Input::Call(call) => call(&mut session),
            Input::Shutdown => break,
        }
    }

    for (remote, notification) in session.shutdown() {
        forward(remote, vec![notification]);
    }
    debug!("session driver stopped");
    Ok(())
}
