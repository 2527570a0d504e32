use crate::domain::ports::{Filter, Record, RecordMeta};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of the newest message, shown in chat lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub sender_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// A two-person conversation. Unread counts live in the counter store under
/// `CounterKey::ChatUnread`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Sorted, so a pair maps to exactly one chat.
    pub participants: [String; 2],
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    LastMessage(LastMessage),
}

impl Chat {
    pub fn between(a: &str, b: &str, now: DateTime<Utc>) -> Result<Self> {
        let (a, b) = (a.trim(), b.trim());
        if a.is_empty() || b.is_empty() {
            return Err(MarketError::ValidationError(
                "chat participants are required".into(),
            ));
        }
        if a == b {
            return Err(MarketError::ValidationError(
                "a chat needs two different participants".into(),
            ));
        }
        Ok(Self {
            meta: RecordMeta::default(),
            participants: Self::pair(a, b),
            last_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn pair(a: &str, b: &str) -> [String; 2] {
        if a <= b {
            [a.to_string(), b.to_string()]
        } else {
            [b.to_string(), a.to_string()]
        }
    }

    pub fn with_pair(a: &str, b: &str) -> Filter<Chat> {
        let pair = Self::pair(a.trim(), b.trim());
        Filter::new(move |chat: &Chat| chat.participants == pair)
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// The other participant, or `InvalidTransition` for outsiders.
    pub fn counterpart(&self, user_id: &str) -> Result<&str> {
        match &self.participants {
            [a, b] if a == user_id => Ok(b),
            [a, b] if b == user_id => Ok(a),
            _ => Err(MarketError::InvalidTransition(format!(
                "{user_id} is not a participant of chat {}",
                self.meta.id
            ))),
        }
    }
}

impl Record for Chat {
    const COLLECTION: &'static str = "chats";
    const ENTITY: &'static str = "chat";
    type Update = ChatUpdate;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn apply(&mut self, update: ChatUpdate) {
        match update {
            ChatUpdate::LastMessage(last) => {
                self.updated_at = last.sent_at;
                self.last_message = Some(last);
            }
        }
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.participants.join("|"))
    }
}

/// One message; never edited except for the read flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageUpdate {
    MarkRead,
}

impl Message {
    pub fn new(
        chat_id: &str,
        sender_id: &str,
        sender_name: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(MarketError::ValidationError(
                "message text must not be empty".into(),
            ));
        }
        Ok(Self {
            meta: RecordMeta::default(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            text: text.to_string(),
            is_read: false,
            created_at: now,
        })
    }

    pub fn in_chat(chat_id: impl Into<String>) -> Filter<Message> {
        let chat_id = chat_id.into();
        Filter::new(move |message: &Message| message.chat_id == chat_id)
    }

    /// Messages in `chat_id` that `reader` has not seen yet.
    pub fn unread_by(chat_id: impl Into<String>, reader: impl Into<String>) -> Filter<Message> {
        let chat_id = chat_id.into();
        let reader = reader.into();
        Filter::new(move |message: &Message| {
            message.chat_id == chat_id && message.sender_id != reader && !message.is_read
        })
    }
}

impl Record for Message {
    const COLLECTION: &'static str = "messages";
    const ENTITY: &'static str = "message";
    type Update = MessageUpdate;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn apply(&mut self, update: MessageUpdate) {
        match update {
            MessageUpdate::MarkRead => self.is_read = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_order_independent() {
        let now = Utc::now();
        let ab = Chat::between("alice", "bob", now).unwrap();
        let ba = Chat::between("bob", "alice", now).unwrap();
        assert_eq!(ab.unique_key(), ba.unique_key());
        assert!(Chat::with_pair("bob", "alice").matches(&ab));
    }

    #[test]
    fn test_counterpart() {
        let chat = Chat::between("alice", "bob", Utc::now()).unwrap();
        assert_eq!(chat.counterpart("alice").unwrap(), "bob");
        assert_eq!(chat.counterpart("bob").unwrap(), "alice");
        assert!(chat.counterpart("eve").is_err());
    }

    #[test]
    fn test_chat_with_self_is_rejected() {
        assert!(matches!(
            Chat::between("alice", "alice", Utc::now()),
            Err(MarketError::ValidationError(_))
        ));
    }

    #[test]
    fn test_unread_filter_skips_own_messages() {
        let now = Utc::now();
        let mine = Message::new("c1", "alice", "Alice", "hi", now).unwrap();
        let theirs = Message::new("c1", "bob", "Bob", "hey", now).unwrap();
        let filter = Message::unread_by("c1", "alice");
        assert!(!filter.matches(&mine));
        assert!(filter.matches(&theirs));
    }
}
