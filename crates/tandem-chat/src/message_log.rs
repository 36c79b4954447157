use chrono::Utc;
use uuid::Uuid;

use tandem_types::models::{Message, MessageKind};

use crate::error::ChatError;
use crate::identity::Conversation;
use crate::store::ChatStore;

pub const MAX_CONTENT_CHARS: usize = 4000;

/// How long after sending a message its sender may still recall it.
pub const RECALL_WINDOW_SECS: i64 = 120;

/// Append-only message store keyed by conversation id.
pub struct MessageLog<'a, S: ChatStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ChatStore + ?Sized> MessageLog<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Append to an existing conversation.
    pub fn append(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message, ChatError> {
        let conversation = self
            .store
            .conversation(conversation_id)?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;
        self.append_to(&conversation, sender_id, content, kind)
    }

    /// Append to a known conversation entity. On the first message this is
    /// what brings the conversation into existence.
    pub fn append_to(
        &self,
        conversation: &Conversation,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message, ChatError> {
        if !conversation.contains(sender_id) {
            return Err(ChatError::NotParticipant {
                conversation_id: conversation.id().to_string(),
                participant_id: sender_id.to_string(),
            });
        }
        validate_content(content, kind)?;

        let message_id = Uuid::new_v4().to_string();
        let message = self
            .store
            .append(conversation, &message_id, sender_id, content, kind)?;
        Ok(message)
    }

    /// Every message of the conversation, oldest first.
    pub fn list_all(&self, conversation_id: &str) -> Result<Vec<Message>, ChatError> {
        Ok(self.store.messages(conversation_id)?)
    }

    pub fn latest(&self, conversation_id: &str) -> Result<Option<Message>, ChatError> {
        let mut latest = self.store.latest_messages(&[conversation_id.to_string()])?;
        Ok(latest.remove(conversation_id))
    }

    /// Flag a message as recalled. Only its sender may do so, and only
    /// within [`RECALL_WINDOW_SECS`] of sending. Recalling twice is a no-op.
    pub fn recall(&self, message_id: &str, participant_id: &str) -> Result<Message, ChatError> {
        let mut message = self
            .store
            .message(message_id)?
            .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;

        if message.sender_id != participant_id {
            return Err(ChatError::NotSender(message_id.to_string()));
        }
        if message.recalled {
            return Ok(message);
        }
        if (Utc::now() - message.created_at).num_seconds() > RECALL_WINDOW_SECS {
            return Err(ChatError::RecallWindowExpired(message_id.to_string()));
        }

        if !self.store.set_recalled(message_id)? {
            return Err(ChatError::MessageNotFound(message_id.to_string()));
        }
        message.recalled = true;
        Ok(message)
    }
}

fn validate_content(content: &str, kind: MessageKind) -> Result<(), ChatError> {
    if kind == MessageKind::Text && content.trim().is_empty() {
        return Err(ChatError::EmptyContent);
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ChatError::ContentTooLong {
            max: MAX_CONTENT_CHARS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_store;

    #[test]
    fn blank_text_rejected() {
        let t = temp_store();
        let log = MessageLog::new(&t.db);
        let conv = Conversation::between("u1", "u2").unwrap();

        for blank in ["", "   ", "\n\t"] {
            assert!(matches!(
                log.append_to(&conv, "u1", blank, MessageKind::Text),
                Err(ChatError::EmptyContent)
            ));
        }
        // Nothing was written, so the conversation still does not exist.
        assert!(t.db.get_conversation(conv.id()).unwrap().is_none());
    }

    #[test]
    fn blank_content_allowed_for_non_text() {
        let t = temp_store();
        let log = MessageLog::new(&t.db);
        let conv = Conversation::between("u1", "u2").unwrap();
        let msg = log.append_to(&conv, "u1", "", MessageKind::Image).unwrap();
        assert_eq!(msg.kind, MessageKind::Image);
    }

    #[test]
    fn oversized_content_rejected() {
        let t = temp_store();
        let log = MessageLog::new(&t.db);
        let conv = Conversation::between("u1", "u2").unwrap();
        let long = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert!(matches!(
            log.append_to(&conv, "u1", &long, MessageKind::Text),
            Err(ChatError::ContentTooLong { .. })
        ));
    }

    #[test]
    fn outsider_cannot_append() {
        let t = temp_store();
        let log = MessageLog::new(&t.db);
        let conv = Conversation::between("u1", "u2").unwrap();
        log.append_to(&conv, "u1", "hi", MessageKind::Text).unwrap();

        assert!(matches!(
            log.append(conv.id(), "u3", "hi", MessageKind::Text),
            Err(ChatError::NotParticipant { .. })
        ));
        assert!(matches!(
            log.append("chat_u1_u3", "u1", "hi", MessageKind::Text),
            Err(ChatError::ConversationNotFound(_))
        ));
    }

    #[test]
    fn list_is_ascending_and_latest_is_newest() {
        let t = temp_store();
        let log = MessageLog::new(&t.db);
        let conv = Conversation::between("u1", "u2").unwrap();
        assert!(log.latest(conv.id()).unwrap().is_none());

        log.append_to(&conv, "u1", "one", MessageKind::Text).unwrap();
        log.append(conv.id(), "u2", "two", MessageKind::Text).unwrap();
        log.append(conv.id(), "u1", "three", MessageKind::Text).unwrap();

        let all = log.list_all(conv.id()).unwrap();
        let contents: Vec<&str> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
        assert!(all.windows(2).all(|w| w[0].created_at < w[1].created_at));
        assert_eq!(log.latest(conv.id()).unwrap().unwrap().content, "three");
    }

    #[test]
    fn recall_rules() {
        let t = temp_store();
        let log = MessageLog::new(&t.db);
        let conv = Conversation::between("u1", "u2").unwrap();
        let msg = log.append_to(&conv, "u1", "oops", MessageKind::Text).unwrap();

        assert!(matches!(
            log.recall(&msg.id, "u2"),
            Err(ChatError::NotSender(_))
        ));
        assert!(matches!(
            log.recall("nope", "u1"),
            Err(ChatError::MessageNotFound(_))
        ));

        let recalled = log.recall(&msg.id, "u1").unwrap();
        assert!(recalled.recalled);
        assert!(log.recall(&msg.id, "u1").unwrap().recalled);
        assert!(log.latest(conv.id()).unwrap().unwrap().recalled);
    }

    #[test]
    fn recall_refused_after_window() {
        let t = temp_store();
        let log = MessageLog::new(&t.db);
        let conv = Conversation::between("u1", "u2").unwrap();
        let msg = log.append_to(&conv, "u1", "too late", MessageKind::Text).unwrap();

        let aged_ms = (RECALL_WINDOW_SECS + 60) * 1000;
        t.db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE messages SET created_at = created_at - ?1 WHERE id = ?2",
                (aged_ms, msg.id.as_str()),
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            log.recall(&msg.id, "u1"),
            Err(ChatError::RecallWindowExpired(_))
        ));
        assert!(!log.latest(conv.id()).unwrap().unwrap().recalled);
    }
}
