use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// A persisted chat message. Only `recalled` ever changes after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    pub recalled: bool,
}

/// Display identity of a user, as served by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// One row of a participant's chat list. Computed per request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub conversation_id: String,
    pub partner_id: String,
    pub partner_name: String,
    pub partner_avatar: Option<String>,
    pub last_message: String,
    pub last_message_kind: MessageKind,
    pub last_message_recalled: bool,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: u64,
}

impl Session {
    /// Unread count as shown on a chat-list badge: empty when read,
    /// clamped to `99+`.
    pub fn unread_badge(&self) -> String {
        match self.unread_count {
            0 => String::new(),
            n @ 1..=99 => n.to_string(),
            _ => "99+".to_string(),
        }
    }
}
