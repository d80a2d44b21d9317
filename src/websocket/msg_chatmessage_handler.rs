use tracing::{error, info};

use crate::models::Broadcast;
use crate::websocket::session::{ActionError, SessionContext};

/// Handle a chat message: persist it, then hand back the broadcast carrying the stored row.
pub async fn handle_chat_message(text: String, ctx: &SessionContext) -> Result<Broadcast, ActionError> {
    info!("Chat message received for club {}: user={}", ctx.club_id, ctx.user_id);

    let message = ctx
        .store
        .create_chat_message(ctx.user_id, ctx.club_id, &text)
        .await
        .map_err(|e| {
            error!("Failed to save chat message for club {}: {}", ctx.club_id, e);
            ActionError::Persistence { action: "save chat message", source: e }
        })?;

    Ok(Broadcast::ChatMessage { user_id: ctx.user_id, data: message })
}
