use std::collections::HashSet;

use tracing::{debug, warn};

use tandem_types::models::Session;

use crate::error::ChatError;
use crate::identity::validate_participant;
use crate::store::{ChatStore, Directory};
use crate::unread::UnreadAggregator;

/// Builds a participant's session list from the message log, read cursors
/// and the directory.
///
/// Round trips are fixed: conversation discovery, latest messages, unread
/// counts and partner profiles, one batched call each. A store failure fails
/// the whole list; a missing partner profile only drops that session.
pub struct ChatListAssembler<'a, S: ChatStore + ?Sized, D: Directory + ?Sized> {
    store: &'a S,
    directory: &'a D,
}

impl<'a, S: ChatStore + ?Sized, D: Directory + ?Sized> ChatListAssembler<'a, S, D> {
    pub fn new(store: &'a S, directory: &'a D) -> Self {
        Self { store, directory }
    }

    /// Sessions ordered by last message time (newest first), ties by
    /// conversation id ascending.
    pub fn assemble(&self, participant_id: &str) -> Result<Vec<Session>, ChatError> {
        validate_participant(participant_id)?;

        let conversations = self.store.conversations_for(participant_id)?;
        if conversations.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = conversations.iter().map(|c| c.id().to_string()).collect();
        let mut latest = self.store.latest_messages(&ids)?;
        let unread = UnreadAggregator::new(self.store).compute_unread(participant_id, &ids)?;

        let partner_ids: Vec<String> = conversations
            .iter()
            .filter_map(|c| c.partner_of(participant_id))
            .map(str::to_string)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let profiles = self.directory.resolve_profiles(&partner_ids)?;

        let mut sessions = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let Some(partner_id) = conversation.partner_of(participant_id) else {
                let id = conversation.id();
                warn!("Store returned conversation {id} without participant {participant_id}");
                continue;
            };

            let Some(last) = latest.remove(conversation.id()) else {
                debug!("Conversation {} has no messages, skipping", conversation.id());
                continue;
            };

            let Some(profile) = profiles.get(partner_id) else {
                let unresolved = ChatError::ConversationUnresolved {
                    conversation_id: conversation.id().to_string(),
                    partner_id: partner_id.to_string(),
                };
                warn!("Dropping session: {}", unresolved);
                continue;
            };

            sessions.push(Session {
                conversation_id: conversation.id().to_string(),
                partner_id: partner_id.to_string(),
                partner_name: profile.display_name.clone(),
                partner_avatar: profile.avatar_url.clone(),
                unread_count: unread.get(conversation.id()).copied().unwrap_or(0),
                last_message: last.content,
                last_message_kind: last.kind,
                last_message_recalled: last.recalled,
                last_message_time: last.created_at,
            });
        }

        sessions.sort_by(|a, b| {
            b.last_message_time
                .cmp(&a.last_message_time)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        Ok(sessions)
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
    fn no_conversations_no_sessions() {
        let t = temp_store();
        let sessions = ChatListAssembler::new(&t.db, &t.db).assemble("u1").unwrap();
        assert!(sessions.is_empty());
    }

    #[test]
    fn newest_conversation_first() {
        let t = temp_store();
        let log = MessageLog::new(&t.db);
        let with_u2 = Conversation::between("u1", "u2").unwrap();
        let with_u3 = Conversation::between("u1", "u3").unwrap();

        log.append_to(&with_u2, "u2", "older", MessageKind::Text).unwrap();
        log.append_to(&with_u3, "u3", "newer", MessageKind::Text).unwrap();

        let sessions = ChatListAssembler::new(&t.db, &t.db).assemble("u1").unwrap();
        let order: Vec<&str> = sessions.iter().map(|s| s.partner_id.as_str()).collect();
        assert_eq!(order, ["u3", "u2"]);
        assert_eq!(sessions[0].partner_name, "Carol");

        log.append_to(&with_u2, "u1", "bump", MessageKind::Text).unwrap();
        let sessions = ChatListAssembler::new(&t.db, &t.db).assemble("u1").unwrap();
        assert_eq!(sessions[0].partner_id, "u2");
        assert_eq!(sessions[0].last_message, "bump");
    }

    #[test]
    fn missing_partner_profile_is_dropped_not_fatal() {
        let t = temp_store();
        let log = MessageLog::new(&t.db);
        let ghost = Conversation::between("u1", "ghost").unwrap();
        let real = Conversation::between("u1", "u2").unwrap();
        log.append_to(&ghost, "ghost", "boo", MessageKind::Text).unwrap();
        log.append_to(&real, "u2", "hi", MessageKind::Text).unwrap();

        let sessions = ChatListAssembler::new(&t.db, &t.db).assemble("u1").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].partner_id, "u2");
    }

    #[test]
    fn invalid_participant_rejected() {
        let t = temp_store();
        assert!(matches!(
            ChatListAssembler::new(&t.db, &t.db).assemble(""),
            Err(ChatError::InvalidParticipants(_))
        ));
    }
}
