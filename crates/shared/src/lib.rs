//! Shared types for the huddle relay server and client.

pub mod display;
pub mod error;
mod lenient;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
