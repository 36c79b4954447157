use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MessageKind;

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the auth handlers.
/// `sub` is the participant id handed to the chat core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub username: String,
    pub token: String,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    /// Required for the first message of a conversation; must derive to the
    /// conversation id in the path.
    #[serde(default)]
    pub recipient_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub conversation_id: String,
    pub last_read_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationRef {
    pub conversation_id: String,
}

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
pub struct PoolStatsResponse {
    pub readers: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub round_trips: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub pool: PoolStatsResponse,
    /// Live `SessionFeed` subscriptions
    pub feed_subscribers: usize,
}
