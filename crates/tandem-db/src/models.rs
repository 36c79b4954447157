//! Row types as they come out of SQLite. Timestamps are unix milliseconds.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

pub struct ProfileRow {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: String,
    pub created_at: i64,
    pub recalled: bool,
}

/// Insert parameters for a new message. The conversation pair is carried so
/// the first append can create the conversation row in the same transaction.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub conversation_id: &'a str,
    pub participant_a: &'a str,
    pub participant_b: &'a str,
    pub sender_id: &'a str,
    pub content: &'a str,
    pub kind: &'a str,
}
