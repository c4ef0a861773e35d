//! Ordered local copy of the shared conversation.

use huddle_shared::ChatMessage;

/// Arrival-ordered chat log. Appends on unseen ids, removes on delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted log verbatim.
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Append `message` unless one with the same id is already present.
    /// Returns true if the log changed.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Remove the message with `id`. Unknown ids are a no-op.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            text: format!("text of {}", id),
            ..ChatMessage::default()
        }
    }

    enum Op {
        New(&'static str),
        Delete(&'static str),
    }

    /// Plain list model the log must agree with.
    fn reference(ops: &[Op]) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for op in ops {
            match op {
                Op::New(id) => {
                    if !ids.iter().any(|i| i == id) {
                        ids.push(id.to_string());
                    }
                }
                Op::Delete(id) => ids.retain(|i| i != id),
            }
        }
        ids
    }

    fn apply(ops: &[Op]) -> Vec<String> {
        let mut log = ChatLog::new();
        for op in ops {
            match op {
                Op::New(id) => {
                    log.append(message(id));
                }
                Op::Delete(id) => {
                    log.remove(id);
                }
            }
        }
        log.messages().iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_matches_reference_model() {
        use Op::*;
        let sequences: Vec<Vec<Op>> = vec![
            vec![],
            vec![New("a"), New("b"), New("c")],
            vec![New("a"), Delete("a")],
            vec![Delete("ghost"), New("a")],
            vec![New("a"), New("a"), New("b")],
            vec![New("a"), New("b"), Delete("a"), New("a")],
            vec![New("a"), Delete("b"), New("c"), Delete("a"), Delete("a"), New("b")],
        ];

        for ops in &sequences {
            assert_eq!(apply(ops), reference(ops));
        }
    }

    #[test]
    fn test_remove_reports_change() {
        let mut log = ChatLog::from_messages(vec![message("m1"), message("m2")]);
        assert!(log.remove("m1"));
        assert!(!log.remove("m1"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.get("m2").map(|m| m.text.as_str()), Some("text of m2"));
    }

    #[test]
    fn test_duplicate_append_keeps_first() {
        let mut log = ChatLog::new();
        assert!(log.append(message("m1")));
        let mut replay = message("m1");
        replay.text = "changed".into();
        assert!(!log.append(replay));
        assert_eq!(log.messages()[0].text, "text of m1");
    }
}
