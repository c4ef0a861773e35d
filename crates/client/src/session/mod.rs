//! Client session state machine.
//!
//! A [`Session`] is either `Disconnected` or `Connected`. It owns the local
//! identity, the handle of the current connection, and the views rebuilt
//! from relayed events: the chat log, who is typing, and the join/leave
//! announcements.
//!
//! Time is always passed in (`now`), so the typing timers can be driven by
//! whatever clock the embedder has.

mod chat_log;
mod typing;

pub use chat_log::ChatLog;
pub use typing::{TypingState, TypingTimer, TYPING_QUIET_PERIOD_MS};

use chrono::{DateTime, Utc};
use huddle_shared::{
    AnnouncementKind, ChatMessage, ClientCommand, Identity, ServerEvent, SystemAnnouncement,
};
use uuid::Uuid;

use crate::error::SessionError;
use crate::storage::{PersistedSession, SessionStore};
use crate::ws::WsHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// Keys the composer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Enter, with or without the line-break modifier (Shift).
    Enter { line_break: bool },
}

pub struct Session<S> {
    store: S,
    identity: Option<Identity>,
    state: SessionState,
    link: Option<WsHandle>,
    chat: ChatLog,
    typing: TypingState,
    announcements: Vec<SystemAnnouncement>,
    composer: String,
    typing_timer: TypingTimer,
}

impl<S: SessionStore> Session<S> {
    /// Start up from whatever `store` has persisted. Always `Disconnected`.
    pub fn load(store: S) -> Self {
        let PersistedSession { identity, chat } = store.load_session();
        crate::log_debug!(
            "Loaded session (identity: {}, {} message(s))",
            identity.is_some(),
            chat.len()
        );

        Self {
            store,
            identity,
            state: SessionState::Disconnected,
            link: None,
            chat: ChatLog::from_messages(chat),
            typing: TypingState::new(),
            announcements: Vec::new(),
            composer: String::new(),
            typing_timer: TypingTimer::default(),
        }
    }

    // --- Accessors ---

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn typing(&self) -> &TypingState {
        &self.typing
    }

    pub fn announcements(&self) -> &[SystemAnnouncement] {
        &self.announcements
    }

    pub fn composer(&self) -> &str {
        &self.composer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Id of the connection currently in use, if any.
    pub fn link_id(&self) -> Option<Uuid> {
        self.link.as_ref().map(WsHandle::id)
    }

    /// Earliest pending timer: the local stop-typing deadline or a remote
    /// typing expiry. Drivers should call [`Self::tick`] at that time.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.typing_timer.deadline(), self.typing.next_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // --- Identity & lifecycle ---

    /// Create and persist a new local identity. Blank names are ignored.
    pub fn login(&mut self, name: &str, avatar: Option<String>) -> Option<&Identity> {
        if name.trim().is_empty() {
            return None;
        }

        let identity = Identity::new(name, avatar);
        crate::log_info!("Logged in as {} ({})", identity.username, identity.user_id);
        self.identity = Some(identity);
        self.persist();
        self.identity.as_ref()
    }

    /// Enter `Connected` on `link` and announce the local identity.
    pub fn connect(&mut self, link: WsHandle) -> Result<(), SessionError> {
        let identity = self.identity.clone().ok_or(SessionError::NoIdentity)?;

        self.drop_link();

        link.send(ClientCommand::Join(identity))?;
        crate::log_info!("Session connected via {}", link.url);
        self.link = Some(link);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Replace the avatar, and re-announce when connected.
    pub fn update_avatar(&mut self, avatar: Option<String>) -> Result<(), SessionError> {
        let identity = self.identity.as_mut().ok_or(SessionError::NoIdentity)?;
        identity.avatar = avatar;
        let identity = identity.clone();
        self.persist();

        if self.is_connected() {
            self.emit(ClientCommand::Join(identity))?;
        }
        Ok(())
    }

    /// The transport went away underneath us. Ignored unless `link_id` is
    /// the connection currently in use, so a late report from a replaced
    /// connection cannot knock out its successor.
    pub fn connection_lost(&mut self, link_id: Uuid) -> bool {
        if self.link_id() != Some(link_id) {
            return false;
        }
        crate::log_warn!("Connection lost");
        self.drop_link();
        true
    }

    /// Forget the identity and chat log (persisted copies too), close the
    /// connection and reset every derived view.
    pub fn logout(&mut self) {
        self.drop_link();
        self.identity = None;
        self.chat.clear();
        self.announcements.clear();
        self.composer.clear();

        if let Err(e) = self.store.clear_session() {
            crate::log_error!("Failed to clear stored session: {}", e);
        }
        crate::log_info!("Logged out");
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.state = SessionState::Disconnected;
        self.typing.clear();
        self.typing_timer.disarm();
    }

    // --- Incoming events ---

    /// Apply one relayed event. Returns true if any view changed.
    pub fn handle_event(&mut self, event: ServerEvent, now: DateTime<Utc>) -> bool {
        match event {
            ServerEvent::MessageNew(message) => {
                let changed = self.chat.append(message);
                if changed {
                    self.persist();
                }
                changed
            }
            ServerEvent::MessageDeleted(id) => {
                let changed = self.chat.remove(&id);
                if changed {
                    self.persist();
                }
                changed
            }
            ServerEvent::Typing(identity) => {
                if self.is_local_username(&identity.username) {
                    return false;
                }
                self.typing.start(&identity.username, now);
                true
            }
            ServerEvent::StopTyping(identity) => self.typing.stop(&identity.username),
            ServerEvent::UserJoined(identity) => {
                self.announce(AnnouncementKind::Joined, identity, now);
                true
            }
            ServerEvent::UserLeft(identity) => {
                self.announce(AnnouncementKind::Left, identity, now);
                true
            }
        }
    }

    /// Apply an event that arrived on connection `link_id`. Events from a
    /// connection that has since been replaced or dropped are ignored.
    pub fn handle_link_event(
        &mut self,
        link_id: Uuid,
        event: ServerEvent,
        now: DateTime<Utc>,
    ) -> bool {
        if self.link_id() != Some(link_id) {
            crate::log_debug!("Ignoring {} from stale connection {}", event.kind(), link_id);
            return false;
        }
        self.handle_event(event, now)
    }

    fn is_local_username(&self, username: &str) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| identity.username == username)
    }

    fn announce(&mut self, kind: AnnouncementKind, identity: Identity, now: DateTime<Utc>) {
        self.announcements.push(SystemAnnouncement {
            kind,
            identity,
            timestamp: now,
        });
    }

    // --- Composer ---

    /// The composer text changed. While connected, non-blank text announces
    /// typing and re-arms the quiet-period timer; clearing it ends typing
    /// straight away.
    pub fn input(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        self.composer = text.into();

        let Some(identity) = self.identity.clone() else {
            return;
        };
        if !self.is_connected() {
            return;
        }

        if self.composer.trim().is_empty() {
            if self.typing_timer.deadline().is_none() {
                return;
            }
            self.typing_timer.disarm();
            if let Err(e) = self.emit(ClientCommand::StopTyping(identity)) {
                crate::log_warn!("Stop-typing notification not sent: {}", e);
            }
            return;
        }

        if let Err(e) = self.emit(ClientCommand::Typing(identity)) {
            crate::log_warn!("Typing notification not sent: {}", e);
            return;
        }
        self.typing_timer.touch(now);
    }

    /// Enter submits; Enter with the line-break modifier inserts a newline.
    pub fn key(
        &mut self,
        key: KeyInput,
        now: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>, SessionError> {
        match key {
            KeyInput::Enter { line_break: true } => {
                let text = format!("{}\n", self.composer);
                self.input(text, now);
                Ok(None)
            }
            KeyInput::Enter { line_break: false } => self.submit(now),
        }
    }

    /// Send the composer contents as a new message. Blank input is ignored
    /// (`Ok(None)`); the text itself is sent untrimmed.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<Option<ChatMessage>, SessionError> {
        if self.composer.trim().is_empty() {
            return Ok(None);
        }
        let identity = self.identity.clone().ok_or(SessionError::NoIdentity)?;
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }

        let message = ChatMessage::compose(&identity, self.composer.as_str(), now);
        self.emit(ClientCommand::SendMessage(message.clone()))?;
        self.composer.clear();

        self.typing_timer.disarm();
        self.emit(ClientCommand::StopTyping(identity))?;
        Ok(Some(message))
    }

    /// Whether `message` was sent under the local identity.
    pub fn is_own(&self, message: &ChatMessage) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| identity.user_id == message.user_id)
    }

    /// Ask everyone (this session included) to drop message `id`. Only
    /// messages in the local log sent under the local identity can be
    /// deleted; anything else returns `Ok(false)` and sends nothing.
    pub fn delete_message(&mut self, id: &str) -> Result<bool, SessionError> {
        let own = self
            .chat
            .get(id)
            .is_some_and(|message| self.is_own(message));
        if !own {
            crate::log_debug!("Not deleting {}: not an own message", id);
            return Ok(false);
        }
        self.emit(ClientCommand::DeleteMessage(id.to_string()))?;
        Ok(true)
    }

    /// Advance timers to `now`: fire the local stop-typing timer and expire
    /// stale remote typing entries. Returns true if any view changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if self.typing_timer.fire(now) {
            if let Some(identity) = self.identity.clone() {
                if let Err(e) = self.emit(ClientCommand::StopTyping(identity)) {
                    crate::log_warn!("Stop-typing notification not sent: {}", e);
                }
            }
        }
        self.typing.expire(now)
    }

    // --- Internals ---

    fn emit(&mut self, cmd: ClientCommand) -> Result<(), SessionError> {
        let link = self.link.as_ref().ok_or(SessionError::NotConnected)?;
        match link.send(cmd) {
            Ok(()) => Ok(()),
            Err(e) => {
                // The transport is gone; stop pretending otherwise
                self.drop_link();
                Err(e)
            }
        }
    }

    fn persist(&self) {
        let snapshot = PersistedSession {
            identity: self.identity.clone(),
            chat: self.chat.messages().to_vec(),
        };
        if let Err(e) = self.store.save_session(&snapshot) {
            crate::log_error!("Failed to save session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests;
