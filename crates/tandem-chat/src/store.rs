use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use tandem_db::Database;
use tandem_db::models::{ConversationRow, MessageRow, NewMessage};
use tandem_types::models::{Message, MessageKind, Profile};

use crate::identity::Conversation;

/// Storage operations the engine needs. Each call is one store round trip;
/// the batched methods take any number of conversation ids in one call.
pub trait ChatStore: Send + Sync {
    fn conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    fn conversations_for(&self, participant_id: &str) -> Result<Vec<Conversation>>;

    /// Append a message, creating the conversation entity if needed.
    fn append(
        &self,
        conversation: &Conversation,
        message_id: &str,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message>;

    /// Messages of one conversation, oldest first.
    fn messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    fn message(&self, message_id: &str) -> Result<Option<Message>>;

    /// Newest message per conversation. Conversations without messages are absent.
    fn latest_messages(&self, conversation_ids: &[String]) -> Result<HashMap<String, Message>>;

    fn set_recalled(&self, message_id: &str) -> Result<bool>;

    /// Move the cursor to now (never backwards) and return the stored value.
    fn advance_read_cursor(&self, conversation_id: &str, participant_id: &str)
    -> Result<DateTime<Utc>>;

    fn read_cursor(&self, conversation_id: &str, participant_id: &str)
    -> Result<Option<DateTime<Utc>>>;

    /// Unread counts per conversation. Zero counts may be absent.
    fn unread_counts(
        &self,
        participant_id: &str,
        conversation_ids: &[String],
    ) -> Result<HashMap<String, u64>>;
}

/// Display identities, owned by the user directory.
pub trait Directory: Send + Sync {
    fn resolve_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    /// Resolve many profiles. Unknown ids are absent from the map.
    fn resolve_profiles(&self, user_ids: &[String]) -> Result<HashMap<String, Profile>> {
        let mut out = HashMap::with_capacity(user_ids.len());
        for id in user_ids {
            if let Some(profile) = self.resolve_profile(id)? {
                out.insert(id.clone(), profile);
            }
        }
        Ok(out)
    }
}

impl ChatStore for Database {
    fn conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self.get_conversation(conversation_id)?.map(conversation_from_row))
    }

    fn conversations_for(&self, participant_id: &str) -> Result<Vec<Conversation>> {
        Ok(self
            .get_conversations_for(participant_id)?
            .into_iter()
            .map(conversation_from_row)
            .collect())
    }

    fn append(
        &self,
        conversation: &Conversation,
        message_id: &str,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message> {
        let (a, b) = conversation.participants();
        let row = self.append_message(&NewMessage {
            id: message_id,
            conversation_id: conversation.id(),
            participant_a: a,
            participant_b: b,
            sender_id,
            content,
            kind: kind.as_str(),
        })?;
        Ok(message_from_row(row))
    }

    fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .get_messages(conversation_id)?
            .into_iter()
            .map(message_from_row)
            .collect())
    }

    fn message(&self, message_id: &str) -> Result<Option<Message>> {
        Ok(self.get_message(message_id)?.map(message_from_row))
    }

    fn latest_messages(&self, conversation_ids: &[String]) -> Result<HashMap<String, Message>> {
        Ok(self
            .get_latest_messages(conversation_ids)?
            .into_iter()
            .map(|row| (row.conversation_id.clone(), message_from_row(row)))
            .collect())
    }

    fn set_recalled(&self, message_id: &str) -> Result<bool> {
        Database::set_recalled(self, message_id)
    }

    fn advance_read_cursor(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<DateTime<Utc>> {
        let stored = self.upsert_read_cursor(conversation_id, participant_id)?;
        Ok(millis_to_utc(stored))
    }

    fn read_cursor(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get_read_cursor(conversation_id, participant_id)?
            .map(millis_to_utc))
    }

    fn unread_counts(
        &self,
        participant_id: &str,
        conversation_ids: &[String],
    ) -> Result<HashMap<String, u64>> {
        self.get_unread_counts(participant_id, conversation_ids)
    }
}

impl Directory for Database {
    fn resolve_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        Ok(self.get_user_by_id(user_id)?.map(|row| Profile {
            user_id: row.id,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
        }))
    }

    fn resolve_profiles(&self, user_ids: &[String]) -> Result<HashMap<String, Profile>> {
        Ok(self
            .get_profiles(user_ids)?
            .into_iter()
            .map(|row| {
                (
                    row.id.clone(),
                    Profile {
                        user_id: row.id,
                        display_name: row.display_name,
                        avatar_url: row.avatar_url,
                    },
                )
            })
            .collect())
    }
}

fn conversation_from_row(row: ConversationRow) -> Conversation {
    Conversation::from_parts(row.id, row.participant_a, row.participant_b)
}

fn message_from_row(row: MessageRow) -> Message {
    let kind = MessageKind::parse(&row.kind).unwrap_or_else(|| {
        warn!("Unknown kind '{}' on message '{}'", row.kind, row.id);
        MessageKind::Text
    });
    Message {
        created_at: millis_to_utc(row.created_at),
        id: row.id,
        conversation_id: row.conversation_id,
        sender_id: row.sender_id,
        content: row.content,
        kind,
        recalled: row.recalled,
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(|| {
        warn!("Timestamp out of range: {}", ms);
        DateTime::UNIX_EPOCH
    })
}
