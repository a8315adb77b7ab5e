//! HTTP endpoints for polling and publishing.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::header,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{BroadcastReport, Timestamp};

#[derive(Debug, Default, Deserialize)]
pub struct PollQuery {
    #[serde(rename = "lastMessageTime")]
    pub last_message_time: Option<String>,
}

impl PollQuery {
    /// Missing or non-numeric values count as "never seen"
    pub fn last_seen(&self) -> Timestamp {
        self.last_message_time
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub waiting: usize,
    pub time: Timestamp,
}

/// Long-poll for the next message.
///
/// GET /poll?lastMessageTime=<n>
///
/// Answers right away if the client is behind, otherwise holds the request
/// until the next broadcast. Closing the connection unparks it.
pub async fn poll(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PollQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    // A repeated lastMessageTime fails to deserialize; that counts as never seen too
    let query = query.map(|Query(query)| query).unwrap_or_else(|e| {
        tracing::debug!("Unreadable poll query, assuming never seen: {}", e);
        PollQuery::default()
    });
    let response = state.broadcaster.wait(query.last_seen()).await?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(response)))
}

/// Broadcast the JSON body to every waiting client.
///
/// POST /api/broadcast
pub async fn publish(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Json<BroadcastReport> {
    Json(state.broadcaster.broadcast(payload))
}

/// GET /api/status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        waiting: state.broadcaster.waiting_count(),
        time: state.broadcaster.last_message_timestamp(),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let publish_routes = Router::new()
        .route("/api/broadcast", post(publish))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::publish_auth_middleware,
        ));

    Router::new()
        .route("/poll", get(poll))
        .route("/api/status", get(status))
        .merge(publish_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
