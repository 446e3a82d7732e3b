use crate::index::VectorIndex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// -- Types --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Local wall-clock time, `HH:MM`.
    pub timestamp: String,
    /// Documents the answer drew on; empty for user messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// One-shot status line shown on the next page render.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

pub fn current_timestamp() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

// -- Session --

/// Per-visitor chat state: the ordered message log plus the index built by
/// the last successful "process documents" action.
#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    index: Option<Arc<VectorIndex>>,
    documents: Vec<String>,
    notices: Vec<Notice>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn index(&self) -> Option<Arc<VectorIndex>> {
        self.index.clone()
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Names of the documents behind the current index.
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn replace_index(&mut self, index: VectorIndex, documents: Vec<String>) {
        self.index = Some(Arc::new(index));
        self.documents = documents;
    }

    /// Empty the message log. The index is kept.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// Record a question and return the timestamp it was stamped with.
    pub fn push_user(&mut self, content: impl Into<String>) -> String {
        let timestamp = current_timestamp();
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: content.into(),
            timestamp: timestamp.clone(),
            sources: Vec::new(),
        });
        timestamp
    }

    /// Whether the log still ends with `question` asked at `timestamp`, so
    /// a reply to it can be appended.
    pub fn awaiting_reply(&self, question: &str, timestamp: &str) -> bool {
        matches!(
            self.messages.last(),
            Some(m) if m.role == ChatRole::User && m.content == question && m.timestamp == timestamp
        )
    }

    pub fn push_assistant(
        &mut self,
        content: impl Into<String>,
        timestamp: String,
        sources: Vec<String>,
    ) {
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp,
            sources,
        });
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::DocumentChunk;

    fn tiny_index() -> VectorIndex {
        VectorIndex::from_parts(
            vec![DocumentChunk {
                source: "a.pdf".into(),
                content: "x".into(),
            }],
            vec![vec![1.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_messages_keep_order_and_roles() {
        let mut session = ChatSession::new();
        let ts = session.push_user("What is my LDL?");
        session.push_assistant("Your LDL is 130 mg/dL.", ts.clone(), vec!["labs.pdf".into()]);

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].role, ChatRole::Assistant);
        assert_eq!(messages[1].timestamp, ts);
        assert_eq!(messages[1].sources, vec!["labs.pdf".to_string()]);
    }

    #[test]
    fn test_awaiting_reply_tracks_last_question() {
        let mut session = ChatSession::new();
        assert!(!session.awaiting_reply("Any allergies?", "09:00"));

        let ts = session.push_user("Any allergies?");
        assert!(session.awaiting_reply("Any allergies?", &ts));
        assert!(!session.awaiting_reply("Other question", &ts));

        session.push_assistant("Penicillin.", ts.clone(), Vec::new());
        assert!(!session.awaiting_reply("Any allergies?", &ts));

        let ts = session.push_user("Any allergies?");
        session.clear_messages();
        assert!(!session.awaiting_reply("Any allergies?", &ts));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = current_timestamp();
        assert_eq!(ts.len(), 5);
        assert_eq!(&ts[2..3], ":");
    }

    #[test]
    fn test_clear_keeps_index() {
        let mut session = ChatSession::new();
        session.replace_index(tiny_index(), vec!["a.pdf".into()]);
        session.push_user("hello");
        session.clear_messages();

        assert!(session.messages().is_empty());
        assert!(session.has_index());
        assert_eq!(session.documents(), ["a.pdf".to_string()]);
    }

    #[test]
    fn test_notices_are_drained() {
        let mut session = ChatSession::new();
        session.notify(Notice::warning("careful"));
        let notices = session.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(session.take_notices().is_empty());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
