use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use tandem_types::api::{Claims, SendMessageRequest};

use crate::auth::AppState;
use crate::error::run_blocking;

/// POST /conversations/{conversation_id}/messages
///
/// The first message of a conversation must name `recipient_id`; the pair
/// has to derive to the path id.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = run_blocking(move || {
        state.chat.send_message(
            &conversation_id,
            &claims.sub,
            &req.content,
            req.kind,
            req.recipient_id.as_deref(),
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /conversations/{conversation_id}/messages, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let messages = run_blocking(move || state.chat.messages(&conversation_id, &claims.sub)).await?;
    Ok(Json(messages))
}

/// POST /messages/{message_id}/recall
pub async fn recall_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = run_blocking(move || state.chat.recall(&message_id, &claims.sub)).await?;
    Ok(Json(message))
}
