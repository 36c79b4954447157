use chrono::{DateTime, Utc};

use crate::error::ChatError;
use crate::store::ChatStore;

/// Per (conversation, participant) last-read watermark.
pub struct ReadCursor<'a, S: ChatStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ChatStore + ?Sized> ReadCursor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Advance the participant's cursor to now. Idempotent; the stored value
    /// never moves backwards.
    pub fn mark_read(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<DateTime<Utc>, ChatError> {
        let conversation = self
            .store
            .conversation(conversation_id)?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;
        if !conversation.contains(participant_id) {
            return Err(ChatError::NotParticipant {
                conversation_id: conversation_id.to_string(),
                participant_id: participant_id.to_string(),
            });
        }

        Ok(self.store.advance_read_cursor(conversation_id, participant_id)?)
    }

    /// The cursor, or the epoch if the participant never read the conversation.
    pub fn get(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<DateTime<Utc>, ChatError> {
        Ok(self
            .store
            .read_cursor(conversation_id, participant_id)?
            .unwrap_or(DateTime::UNIX_EPOCH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Conversation;
    use crate::message_log::MessageLog;
    use crate::test_support::temp_store;
    use tandem_types::models::MessageKind;

    #[test]
    fn unread_conversation_defaults_to_epoch() {
        let t = temp_store();
        let cursors = ReadCursor::new(&t.db);
        assert_eq!(cursors.get("chat_u1_u2", "u1").unwrap(), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn repeated_marks_never_regress() {
        let t = temp_store();
        let conv = Conversation::between("u1", "u2").unwrap();
        MessageLog::new(&t.db)
            .append_to(&conv, "u1", "hi", MessageKind::Text)
            .unwrap();

        let cursors = ReadCursor::new(&t.db);
        let first = cursors.mark_read(conv.id(), "u2").unwrap();
        let second = cursors.mark_read(conv.id(), "u2").unwrap();
        assert!(second >= first);
        assert_eq!(cursors.get(conv.id(), "u2").unwrap(), second);
    }

    #[test]
    fn outsiders_and_unknown_conversations_rejected() {
        let t = temp_store();
        let conv = Conversation::between("u1", "u2").unwrap();
        MessageLog::new(&t.db)
            .append_to(&conv, "u1", "hi", MessageKind::Text)
            .unwrap();

        let cursors = ReadCursor::new(&t.db);
        assert!(matches!(
            cursors.mark_read(conv.id(), "u3"),
            Err(ChatError::NotParticipant { .. })
        ));
        assert!(matches!(
            cursors.mark_read("chat_u2_u3", "u2"),
            Err(ChatError::ConversationNotFound(_))
        ));
    }
}
