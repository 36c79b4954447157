use std::borrow::Cow;

use crate::error::ChatError;

const KEY_PREFIX: &str = "chat";
const SEPARATOR: char = '_';

/// Derive the conversation key for two participants.
///
/// The ids are sorted, so both sides compute the same key without any
/// lookup. Ids containing the separator (or the escape character) are
/// percent-escaped first, which keeps the key injective: `"a_b"`+`"c"` and
/// `"a"`+`"b_c"` map to different keys.
pub fn derive_id(a: &str, b: &str) -> Result<String, ChatError> {
    validate_participant(a)?;
    validate_participant(b)?;
    if a == b {
        return Err(ChatError::InvalidParticipants(format!(
            "self-conversation for {} is not supported",
            a
        )));
    }

    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    Ok(format!(
        "{KEY_PREFIX}{SEPARATOR}{}{SEPARATOR}{}",
        escape(lo),
        escape(hi)
    ))
}

/// Reject empty ids and ids with whitespace or control characters.
pub fn validate_participant(id: &str) -> Result<(), ChatError> {
    if id.is_empty() {
        return Err(ChatError::InvalidParticipants("empty participant id".into()));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ChatError::InvalidParticipants(format!(
            "malformed participant id {:?}",
            id
        )));
    }
    Ok(())
}

fn escape(id: &str) -> Cow<'_, str> {
    if !id.contains(['%', SEPARATOR]) {
        return Cow::Borrowed(id);
    }
    Cow::Owned(id.replace('%', "%25").replace(SEPARATOR, "%5F"))
}

/// A two-party conversation. Membership lives in the ordered pair; the
/// derived key is only an index and is never parsed back into ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    id: String,
    participants: (String, String),
}

impl Conversation {
    pub fn between(a: &str, b: &str) -> Result<Self, ChatError> {
        let id = derive_id(a, b)?;
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        Ok(Self {
            id,
            participants: (lo.to_string(), hi.to_string()),
        })
    }

    /// Rebuild from a stored row. The store keeps the pair ordered.
    pub fn from_parts(id: String, participant_a: String, participant_b: String) -> Self {
        Self {
            id,
            participants: (participant_a, participant_b),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn participants(&self) -> (&str, &str) {
        (&self.participants.0, &self.participants.1)
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.participants.0 == participant_id || self.participants.1 == participant_id
    }

    /// The other side of the conversation, if `participant_id` is a member.
    pub fn partner_of(&self, participant_id: &str) -> Option<&str> {
        if self.participants.0 == participant_id {
            Some(&self.participants.1)
        } else if self.participants.1 == participant_id {
            Some(&self.participants.0)
        } else {
            None
        }
    }

    pub(crate) fn into_pair(self) -> (String, String) {
        self.participants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ids_render_readable_key() {
        assert_eq!(derive_id("u1", "u2").unwrap(), "chat_u1_u2");
        assert_eq!(derive_id("u2", "u1").unwrap(), "chat_u1_u2");
    }

    #[test]
    fn derivation_is_order_independent() {
        let ids = ["alice", "bob", "u10", "u9", "a_b", "x%y", "Z", "ünï"];
        for a in ids {
            for b in ids {
                if a != b {
                    assert_eq!(derive_id(a, b).unwrap(), derive_id(b, a).unwrap());
                }
            }
        }
    }

    #[test]
    fn self_conversation_rejected() {
        assert!(matches!(
            derive_id("u1", "u1"),
            Err(ChatError::InvalidParticipants(_))
        ));
    }

    #[test]
    fn malformed_ids_rejected() {
        for bad in ["", "u 1", "u\n1", "\t"] {
            assert!(
                matches!(derive_id(bad, "u2"), Err(ChatError::InvalidParticipants(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn separator_in_ids_does_not_collide() {
        let left = derive_id("a_b", "c").unwrap();
        let right = derive_id("a", "b_c").unwrap();
        assert_ne!(left, right);
        assert_eq!(left, "chat_a%5Fb_c");
        assert_ne!(derive_id("a%5Fb", "c").unwrap(), left);
    }

    #[test]
    fn partner_comes_from_pair_not_key() {
        let conv = Conversation::between("a_b", "c").unwrap();
        assert_eq!(conv.partner_of("c"), Some("a_b"));
        assert_eq!(conv.partner_of("a_b"), Some("c"));
        assert_eq!(conv.partner_of("a"), None);
        assert!(conv.contains("c"));
        assert_eq!(conv.participants(), ("a_b", "c"));
    }
}
