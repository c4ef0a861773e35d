//! Native driver for a [`Session`].
//!
//! [`ChatClient`] owns the session behind a mutex, feeds it events from a
//! [`WsConnection`], and runs a background ticker for the typing timers.
//! Every change bumps a revision counter that front ends can watch.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use huddle_shared::{ChatMessage, Identity, ServerEvent, WsEnvelope};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::{KeyInput, Session};
use crate::storage::SessionStore;
use crate::ws::{ConnectionState, WsConnection};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// A session wired to a relay at a fixed URL.
///
/// Must be created from within a tokio runtime.
pub struct ChatClient<S: SessionStore + Send + 'static> {
    session: Arc<Mutex<Session<S>>>,
    url: String,
    connection: Option<WsConnection>,
    revision: Arc<watch::Sender<u64>>,
    ticker: JoinHandle<()>,
}

impl<S: SessionStore + Send + 'static> ChatClient<S> {
    pub fn new(store: S, url: impl Into<String>) -> Self {
        let session = Arc::new(Mutex::new(Session::load(store)));
        let (revision, _) = watch::channel(0u64);
        let revision = Arc::new(revision);

        let ticker = {
            let session = session.clone();
            let revision = revision.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(TICK_INTERVAL);
                loop {
                    interval.tick().await;
                    let changed = session.lock().tick(Utc::now());
                    if changed {
                        bump(&revision);
                    }
                }
            })
        };

        Self {
            session,
            url: url.into(),
            connection: None,
            revision,
            ticker,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Lock the session for reading. Mutate through the client's methods so
    /// watchers are notified.
    pub fn session(&self) -> MutexGuard<'_, Session<S>> {
        self.session.lock()
    }

    /// Receiver that changes whenever any session view may have changed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn login(&self, name: &str, avatar: Option<String>) -> Option<Identity> {
        let identity = self.session.lock().login(name, avatar).cloned();
        if identity.is_some() {
            bump(&self.revision);
        }
        identity
    }

    /// Open a connection to the relay and announce the local identity.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        let mut session = self.session.lock();
        if session.identity().is_none() {
            return Err(SessionError::NoIdentity);
        }

        // Callbacks lock the session before reading the id, and the lock is
        // held until the id is set, so they always see it.
        let link_id: Arc<OnceLock<Uuid>> = Arc::new(OnceLock::new());

        let on_event = {
            let session = self.session.clone();
            let revision = self.revision.clone();
            let link_id = link_id.clone();
            move |envelope: WsEnvelope<ServerEvent>| {
                let mut session = session.lock();
                let Some(id) = link_id.get() else {
                    return;
                };
                if session.handle_link_event(*id, envelope.payload, Utc::now()) {
                    drop(session);
                    bump(&revision);
                }
            }
        };
        let on_state = {
            let session = self.session.clone();
            let revision = self.revision.clone();
            let link_id = link_id.clone();
            move |state: ConnectionState| {
                if !state.is_terminal() {
                    return;
                }
                let mut session = session.lock();
                if let Some(id) = link_id.get() {
                    if session.connection_lost(*id) {
                        drop(session);
                        bump(&revision);
                    }
                }
            }
        };

        let connection = WsConnection::open(self.url.clone(), on_event, on_state);
        let handle = connection.handle();
        let _ = link_id.set(handle.id());

        if let Err(e) = session.connect(handle) {
            connection.close();
            return Err(e);
        }
        drop(session);

        if let Some(previous) = self.connection.replace(connection) {
            previous.close();
        }
        bump(&self.revision);
        Ok(())
    }

    pub fn update_avatar(&self, avatar: Option<String>) -> Result<(), SessionError> {
        self.mutate(|session| session.update_avatar(avatar))
    }

    pub fn input(&self, text: impl Into<String>) {
        self.mutate(|session| session.input(text, Utc::now()))
    }

    pub fn key(&self, key: KeyInput) -> Result<Option<ChatMessage>, SessionError> {
        self.mutate(|session| session.key(key, Utc::now()))
    }

    pub fn submit(&self) -> Result<Option<ChatMessage>, SessionError> {
        self.mutate(|session| session.submit(Utc::now()))
    }

    pub fn delete_message(&self, id: &str) -> Result<bool, SessionError> {
        self.mutate(|session| session.delete_message(id))
    }

    pub fn logout(&mut self) {
        self.session.lock().logout();
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        bump(&self.revision);
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Session<S>) -> R) -> R {
        let result = f(&mut self.session.lock());
        bump(&self.revision);
        result
    }
}

impl<S: SessionStore + Send + 'static> Drop for ChatClient<S> {
    fn drop(&mut self) {
        self.ticker.abort();
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}

fn bump(revision: &watch::Sender<u64>) {
    revision.send_modify(|rev| *rev = rev.wrapping_add(1));
}
