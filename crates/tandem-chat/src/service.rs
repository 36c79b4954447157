use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use tandem_types::events::SessionEvent;
use tandem_types::models::{Message, MessageKind, Session};

use crate::assembler::ChatListAssembler;
use crate::error::ChatError;
use crate::feed::SessionFeed;
use crate::identity::{Conversation, derive_id};
use crate::message_log::MessageLog;
use crate::read_cursor::ReadCursor;
use crate::store::{ChatStore, Directory};

/// The engine's external operations, one per endpoint. Every method takes
/// an already-authenticated participant id.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    directory: Arc<dyn Directory>,
    feed: SessionFeed,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn Directory>,
        feed: SessionFeed,
    ) -> Self {
        Self {
            store,
            directory,
            feed,
        }
    }

    pub fn feed(&self) -> &SessionFeed {
        &self.feed
    }

    pub fn sessions(&self, participant_id: &str) -> Result<Vec<Session>, ChatError> {
        let sessions = ChatListAssembler::new(self.store.as_ref(), self.directory.as_ref())
            .assemble(participant_id)?;
        debug!("Assembled {} sessions for {}", sessions.len(), participant_id);
        Ok(sessions)
    }

    pub fn mark_read(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<DateTime<Utc>, ChatError> {
        let last_read_at =
            ReadCursor::new(self.store.as_ref()).mark_read(conversation_id, participant_id)?;

        if let Some(conversation) = self.store.conversation(conversation_id)? {
            self.feed.publish(SessionEvent::ReadMarked {
                conversation_id: conversation_id.to_string(),
                participants: conversation.into_pair(),
                participant_id: participant_id.to_string(),
                last_read_at,
            });
        }
        Ok(last_read_at)
    }

    /// Send into `conversation_id`. For a conversation that does not exist
    /// yet, `recipient_id` names the partner and must derive to the same id.
    pub fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
        recipient_id: Option<&str>,
    ) -> Result<Message, ChatError> {
        let conversation = match self.store.conversation(conversation_id)? {
            Some(existing) => {
                if !existing.contains(sender_id) {
                    return Err(ChatError::NotParticipant {
                        conversation_id: conversation_id.to_string(),
                        participant_id: sender_id.to_string(),
                    });
                }
                if let Some(recipient) = recipient_id {
                    if existing.partner_of(sender_id) != Some(recipient) {
                        return Err(ChatError::InvalidParticipants(format!(
                            "{} is not the partner in {}",
                            recipient, conversation_id
                        )));
                    }
                }
                existing
            }
            None => {
                let recipient = recipient_id
                    .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;
                let started = Conversation::between(sender_id, recipient)?;
                if started.id() != conversation_id {
                    return Err(ChatError::InvalidParticipants(format!(
                        "{} and {} do not form conversation {}",
                        sender_id, recipient, conversation_id
                    )));
                }
                info!("Starting conversation {}", conversation_id);
                started
            }
        };

        let message = MessageLog::new(self.store.as_ref()).append_to(
            &conversation,
            sender_id,
            content,
            kind,
        )?;

        self.feed.publish(SessionEvent::MessageAppended {
            conversation_id: message.conversation_id.clone(),
            participants: conversation.into_pair(),
            sender_id: message.sender_id.clone(),
            created_at: message.created_at,
        });
        Ok(message)
    }

    /// Message history, oldest first. Only participants may read it.
    pub fn messages(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
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
        MessageLog::new(self.store.as_ref()).list_all(conversation_id)
    }

    pub fn recall(&self, message_id: &str, participant_id: &str) -> Result<Message, ChatError> {
        let message = MessageLog::new(self.store.as_ref()).recall(message_id, participant_id)?;

        if let Some(conversation) = self.store.conversation(&message.conversation_id)? {
            self.feed.publish(SessionEvent::MessageRecalled {
                conversation_id: message.conversation_id.clone(),
                participants: conversation.into_pair(),
                message_id: message.id.clone(),
            });
        }
        Ok(message)
    }

    /// The conversation id shared with `partner_id`, whether or not any
    /// message has been exchanged yet.
    pub fn conversation_with(
        &self,
        participant_id: &str,
        partner_id: &str,
    ) -> Result<String, ChatError> {
        derive_id(participant_id, partner_id)
    }
}
