//! Rendering helpers shared by any front end.

use chrono::{DateTime, Local};

/// Avatar fallback: first letter of the first word, or the first letters of
/// the first two words.
pub fn initials(name: &str) -> String {
    let mut words = name.split_whitespace();
    let Some(first) = words.next() else {
        return "?".to_string();
    };

    first
        .chars()
        .take(1)
        .chain(words.next().into_iter().flat_map(|w| w.chars().take(1)))
        .flat_map(char::to_uppercase)
        .collect()
}

/// `HH:MM` in local time. Unparsable timestamps are returned as-is.
pub fn short_time(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(t) => t.with_timezone(&Local).format("%H:%M").to_string(),
        Err(_) => timestamp.to_string(),
    }
}

/// "Alice is typing..." / "Alice, Bob are typing...", `None` when nobody is.
pub fn typing_label<S: AsRef<str>>(users: &[S]) -> Option<String> {
    match users {
        [] => None,
        [one] => Some(format!("{} is typing...", one.as_ref())),
        many => {
            let names: Vec<&str> = many.iter().map(AsRef::as_ref).collect();
            Some(format!("{} are typing...", names.join(", ")))
        }
    }
}
