//! Conversation history with a single open (still streaming) slot.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    role: ChatRole,
    content: String,
    is_streaming: bool,
}

impl Message {
    fn closed(role: ChatRole, content: String) -> Self {
        Self {
            role,
            content,
            is_streaming: false,
        }
    }

    pub fn role(&self) -> ChatRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }
}

/// Append-only message log plus the index of the one message that may still
/// change. The open slot, when present, is always the last message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
    #[serde(skip)]
    open: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The message currently being streamed into, if any.
    pub fn open_message(&self) -> Option<&Message> {
        self.open.map(|idx| &self.messages[idx])
    }

    pub fn has_open(&self) -> bool {
        self.open.is_some()
    }

    pub(crate) fn push_closed(&mut self, role: ChatRole, content: impl Into<String>) {
        debug_assert!(self.open.is_none(), "closed message appended after open slot");
        self.messages.push(Message::closed(role, content.into()));
    }

    /// Append an empty streaming assistant message and make it the open slot.
    /// Returns false (and changes nothing) if a slot is already open.
    pub(crate) fn open_assistant(&mut self) -> bool {
        if self.open.is_some() {
            return false;
        }
        self.messages.push(Message {
            role: ChatRole::Assistant,
            content: String::new(),
            is_streaming: true,
        });
        self.open = Some(self.messages.len() - 1);
        true
    }

    pub(crate) fn append_open(&mut self, text: &str) -> bool {
        match self.open.and_then(|idx| self.messages.get_mut(idx)) {
            Some(message) => {
                message.content.push_str(text);
                true
            }
            None => false,
        }
    }

    pub(crate) fn replace_open(&mut self, text: &str) -> bool {
        match self.open.and_then(|idx| self.messages.get_mut(idx)) {
            Some(message) => {
                message.content = text.to_string();
                true
            }
            None => false,
        }
    }

    /// Freeze the open message with whatever content it has.
    pub(crate) fn close_open(&mut self) -> bool {
        match self.open.take().and_then(|idx| self.messages.get_mut(idx)) {
            Some(message) => {
                message.is_streaming = false;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
        self.open = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_slot_is_last_and_unique() {
        let mut t = Transcript::new();
        t.push_closed(ChatRole::User, "hi");
        assert!(t.open_assistant());
        assert!(!t.open_assistant());
        assert_eq!(t.len(), 2);
        assert_eq!(t.open_message(), t.last());
        assert_eq!(t.messages().iter().filter(|m| m.is_streaming()).count(), 1);
    }

    #[test]
    fn test_append_then_close_freezes_message() {
        let mut t = Transcript::new();
        t.open_assistant();
        t.append_open("Hel");
        t.append_open("lo");
        assert!(t.close_open());
        assert!(!t.append_open("!"));
        assert!(!t.replace_open("?"));
        let last = t.last().unwrap();
        assert_eq!(last.content(), "Hello");
        assert!(!last.is_streaming());
        assert!(!t.has_open());
    }

    #[test]
    fn test_serializes_roles_lowercase() {
        let mut t = Transcript::new();
        t.push_closed(ChatRole::Assistant, "Hi there!");
        let value = serde_json::to_value(&t).unwrap();
        assert_eq!(value["messages"][0]["role"], "assistant");
        assert_eq!(value["messages"][0]["is_streaming"], false);
    }
}
