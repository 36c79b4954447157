use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Change notifications published whenever a session list may have moved.
/// Each event names both participants of the affected conversation so a
/// subscriber can filter without another lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// A message was appended to a conversation
    MessageAppended {
        conversation_id: String,
        participants: (String, String),
        sender_id: String,
        created_at: DateTime<Utc>,
    },

    /// A sender recalled one of their messages
    MessageRecalled {
        conversation_id: String,
        participants: (String, String),
        message_id: String,
    },

    /// A participant advanced their read cursor
    ReadMarked {
        conversation_id: String,
        participants: (String, String),
        participant_id: String,
        last_read_at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::MessageAppended { conversation_id, .. }
            | Self::MessageRecalled { conversation_id, .. }
            | Self::ReadMarked { conversation_id, .. } => conversation_id,
        }
    }

    /// Returns true if this event can change `participant_id`'s session list.
    pub fn concerns(&self, participant_id: &str) -> bool {
        match self {
            Self::MessageAppended { participants, .. }
            | Self::MessageRecalled { participants, .. } => {
                participants.0 == participant_id || participants.1 == participant_id
            }
            // Only the reader's own unread count moves.
            Self::ReadMarked { participant_id: reader, .. } => reader == participant_id,
        }
    }
}
