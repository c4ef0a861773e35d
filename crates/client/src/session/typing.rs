//! Typing indicators, both directions.

use chrono::{DateTime, TimeDelta, Utc};

/// Quiet period after the last keystroke before typing is considered over.
pub const TYPING_QUIET_PERIOD_MS: i64 = 1000;

fn quiet_period() -> TimeDelta {
    TimeDelta::milliseconds(TYPING_QUIET_PERIOD_MS)
}

/// Usernames other clients report as typing, in the order they started.
///
/// An entry goes away on an explicit stop or once the quiet period passes
/// without a fresh typing event, whichever comes first.
#[derive(Debug, Clone, Default)]
pub struct TypingState {
    entries: Vec<(String, DateTime<Utc>)>,
}

impl TypingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `username` as typing as of `now`, re-arming its expiry.
    pub fn start(&mut self, username: &str, now: DateTime<Utc>) {
        let expires_at = now + quiet_period();
        match self.entries.iter_mut().find(|(name, _)| name == username) {
            Some(entry) => entry.1 = expires_at,
            None => self.entries.push((username.to_string(), expires_at)),
        }
    }

    pub fn stop(&mut self, username: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(name, _)| name != username);
        self.entries.len() != before
    }

    /// Drop entries whose quiet period has elapsed. Returns true if any were.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(_, expires_at)| *expires_at > now);
        self.entries.len() != before
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == username)
    }

    pub fn users(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|(_, expires_at)| *expires_at).min()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The local side: each keystroke re-arms the timer, and it fires once.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypingTimer {
    deadline: Option<DateTime<Utc>>,
}

impl TypingTimer {
    /// Re-arm for a keystroke at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.deadline = Some(now + quiet_period());
    }

    /// True exactly once, at the first call at or after the deadline.
    pub fn fire(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_entry_lives_for_quiet_period() {
        let mut typing = TypingState::new();
        typing.start("Bob", at(0));

        assert!(!typing.expire(at(999)));
        assert!(typing.contains("Bob"));
        assert!(typing.expire(at(1000)));
        assert!(!typing.contains("Bob"));
    }

    #[test]
    fn test_restart_extends_expiry() {
        let mut typing = TypingState::new();
        typing.start("Bob", at(0));
        typing.start("Bob", at(200));

        assert_eq!(typing.users(), vec!["Bob"]);
        assert_eq!(typing.next_expiry(), Some(at(1200)));
        typing.expire(at(1100));
        assert!(typing.contains("Bob"));
    }

    #[test]
    fn test_stop_removes_immediately() {
        let mut typing = TypingState::new();
        typing.start("Bob", at(0));
        typing.start("Carol", at(10));

        assert!(typing.stop("Bob"));
        assert!(!typing.stop("Bob"));
        assert_eq!(typing.users(), vec!["Carol"]);
    }

    #[test]
    fn test_timer_fires_once() {
        let mut timer = TypingTimer::default();
        assert!(!timer.fire(at(5000)));

        timer.touch(at(0));
        timer.touch(at(300));
        assert!(!timer.fire(at(1000)));
        assert!(timer.fire(at(1300)));
        assert!(!timer.fire(at(2000)));
    }

    #[test]
    fn test_disarmed_timer_never_fires() {
        let mut timer = TypingTimer::default();
        timer.touch(at(0));
        timer.disarm();
        assert_eq!(timer.deadline(), None);
        assert!(!timer.fire(at(5000)));
    }
}
