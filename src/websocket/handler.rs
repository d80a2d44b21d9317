use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::auth::AuthError;
use crate::state::AppState;
use crate::websocket::codec;
use crate::websocket::session::ClientSession;

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub token: Option<String>,
}

/// Relay endpoint for one club.
///
/// The caller is checked before a session exists: club first, then token, then
/// membership. Rejected callers are still upgraded so they can read the reason
/// as a regular error frame, followed by a policy-violation close.
pub async fn relay_handler(
    Path(club_id): Path<String>,
    Query(query): Query<RelayQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("New relay connection attempt for club {}", club_id);

    let verdict = state
        .authorizer
        .verify_and_authorize(query.token.as_deref(), &club_id)
        .await;

    let ws = ws.max_message_size(state.timings.max_message_size);
    match verdict {
        Ok(authorized) => {
            info!(
                "Relay connection accepted for club {}: user={}",
                authorized.club_id, authorized.user_id
            );
            ws.on_upgrade(move |socket| async move {
                let _guard = state.track_session();
                let session = ClientSession::new(
                    authorized,
                    state.store.clone(),
                    state.broker.clone(),
                    state.timings,
                );
                session.run(socket).await;
            })
        }
        Err(err) => {
            warn!("Relay connection rejected for club {}: {}", club_id, err);
            let write_wait = state.timings.write_wait;
            ws.on_upgrade(move |socket| reject(socket, err, write_wait))
        }
    }
}

async fn reject(mut socket: WebSocket, err: AuthError, write_wait: Duration) {
    let reason = err.to_string();
    let frame = Message::Text(codec::encode_error(&reason));
    if timeout(write_wait, socket.send(frame)).await.is_err() {
        return;
    }
    let close = Message::Close(Some(CloseFrame {
        code: close_code::POLICY,
        reason: reason.into(),
    }));
    let _ = timeout(write_wait, socket.send(close)).await;
}
