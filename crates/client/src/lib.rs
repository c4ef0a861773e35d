//! huddle client core.
//!
//! [`Session`] is the client-side state machine: local identity, connection
//! lifecycle, and the chat log, typing and presence views rebuilt from
//! relayed events. [`ws`] supplies the WebSocket transport (tokio-tungstenite
//! natively, `web_sys::WebSocket` in the browser) and [`storage`] the
//! persistence collaborator. Rendering is left to the embedding front end.

pub mod error;
pub mod logging;
pub mod session;
pub mod storage;
pub mod ws;

#[cfg(not(target_arch = "wasm32"))]
pub mod client;

#[cfg(not(target_arch = "wasm32"))]
pub use client::ChatClient;
pub use error::SessionError;
pub use session::{KeyInput, Session, SessionState};
pub use storage::{LocalStore, MemoryStore, PersistedSession, SessionStore, StorageError};
pub use ws::{ConnectionState, WsConnection, WsHandle};
