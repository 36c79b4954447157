use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use tandem_types::api::{
    Claims, ConversationRef, HealthResponse, MarkReadResponse, PoolStatsResponse,
};

use crate::auth::AppState;
use crate::error::{run_blocking, status_for};

/// GET /sessions: the caller's chat list, assembled fresh on every call.
pub async fn get_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let sessions = run_blocking(move || state.chat.sessions(&claims.sub)).await?;
    Ok(Json(sessions))
}

/// POST /conversations/{conversation_id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let cid = conversation_id.clone();
    let last_read_at = run_blocking(move || state.chat.mark_read(&cid, &claims.sub)).await?;

    Ok(Json(MarkReadResponse {
        conversation_id,
        last_read_at,
    }))
}

/// GET /partners/{partner_id}/conversation: the id shared with a partner.
pub async fn conversation_with(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let conversation_id = state
        .chat
        .conversation_with(&claims.sub, &partner_id)
        .map_err(|e| status_for(&e))?;
    Ok(Json(ConversationRef { conversation_id }))
}

/// GET /health: store pool usage.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.db.stats();
    debug!(
        "Pool: {} readers, {} queued, {} in flight, {} round trips",
        stats.readers, stats.queued, stats.in_flight, stats.round_trips
    );

    Json(HealthResponse {
        status: "ok".into(),
        feed_subscribers: state.chat.feed().subscriber_count(),
        pool: PoolStatsResponse {
            readers: stats.readers,
            queued: stats.queued,
            in_flight: stats.in_flight,
            round_trips: stats.round_trips,
        },
    })
}
