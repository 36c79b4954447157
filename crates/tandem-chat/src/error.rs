use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Self-conversation, or an id that is empty or contains whitespace
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("text message content is empty")]
    EmptyContent,

    #[error("message content exceeds {max} characters")]
    ContentTooLong { max: usize },

    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    #[error("{participant_id} is not a participant of {conversation_id}")]
    NotParticipant {
        conversation_id: String,
        participant_id: String,
    },

    #[error("message {0} not found")]
    MessageNotFound(String),

    #[error("only the sender may recall message {0}")]
    NotSender(String),

    #[error("recall window for message {0} has expired")]
    RecallWindowExpired(String),

    /// Never returned to callers: the assembler logs it and omits the session.
    #[error("conversation {conversation_id}: partner {partner_id} has no directory profile")]
    ConversationUnresolved {
        conversation_id: String,
        partner_id: String,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl ChatError {
    /// Store outages may succeed on retry; everything else is a caller error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}
