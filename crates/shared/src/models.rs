//! Shared data models for the chat relay.
//!
//! The relay forwards payloads without validating them, so every field
//! reads leniently: a missing, `null` or wrongly typed value decodes to its
//! empty form instead of failing the whole event. Avatars also answer to
//! `dp`, the name older web clients use.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::lenient;

// --- Identity ---

/// A user's profile as announced on a connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default, deserialize_with = "lenient::string")]
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub username: String,
    /// Inline-encoded image (usually a `data:` URL).
    #[serde(
        default,
        alias = "dp",
        deserialize_with = "lenient::optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<String>,
}

impl Identity {
    /// Create a fresh identity with a random user id.
    pub fn new(username: impl Into<String>, avatar: Option<String>) -> Self {
        Self {
            user_id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            avatar,
        }
    }

    /// Best-effort read of an identity payload of unknown shape.
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self::deserialize(value).unwrap_or_default()
    }
}

// --- Messaging ---

/// A chat message, replicated by value to every connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub username: String,
    #[serde(
        default,
        alias = "dp",
        deserialize_with = "lenient::optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<String>,
    /// Message body, embedded newlines preserved.
    #[serde(default, deserialize_with = "lenient::string")]
    pub text: String,
    /// ISO-8601 creation time as stamped by the sender.
    #[serde(default, deserialize_with = "lenient::string")]
    pub timestamp: String,
}

impl ChatMessage {
    /// Build a new message authored by `author` at `now`.
    pub fn compose(author: &Identity, text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: author.user_id.clone(),
            username: author.username.clone(),
            avatar: author.avatar.clone(),
            text: text.into(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// The identity this message was sent under.
    pub fn author(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }

    /// Parse the sender's timestamp, if it is a valid RFC 3339 string.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

// --- Presence ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AnnouncementKind {
    Joined,
    Left,
}

/// A local, never persisted presence line ("Alice joined").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemAnnouncement {
    pub kind: AnnouncementKind,
    pub identity: Identity,
    pub timestamp: DateTime<Utc>,
}
