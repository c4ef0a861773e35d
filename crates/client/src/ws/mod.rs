//! WebSocket transport to the relay.
//!
//! ```text
//!  Session ──WsHandle──▶ queue ──▶ writer ──▶ socket
//!     ▲                                          │
//!     └──────── on_event / on_state ◀── reader ◀─┘
//! ```
//!
//! The transport never touches session state itself: incoming envelopes and
//! state changes are handed to callbacks, and the embedder feeds them into
//! `Session::handle_event` / `Session::connection_lost`.

mod connection;

pub use connection::{ConnectionState, WsConnection, WsHandle};
