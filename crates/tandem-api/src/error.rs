use axum::http::StatusCode;
use tracing::{error, warn};

use tandem_chat::ChatError;

/// Run a chat-core call on the blocking pool and map its error to a status.
pub async fn run_blocking<T, F>(f: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| status_for(&e))
}

pub fn status_for(err: &ChatError) -> StatusCode {
    match err {
        ChatError::InvalidParticipants(_) | ChatError::EmptyContent => StatusCode::BAD_REQUEST,
        ChatError::ContentTooLong { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ChatError::ConversationNotFound(_) | ChatError::MessageNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ChatError::NotParticipant { .. } | ChatError::NotSender(_) => StatusCode::FORBIDDEN,
        ChatError::RecallWindowExpired(_) => StatusCode::CONFLICT,
        ChatError::ConversationUnresolved { .. } => {
            warn!("Unresolved conversation reached the HTTP layer: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ChatError::Persistence(e) => {
            // Retryable: the client keeps its cached list and tries again.
            error!("Store failure: {:#}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
