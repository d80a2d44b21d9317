use tracing::{error, info};
use uuid::Uuid;

use crate::db::StoreError;
use crate::models::Broadcast;
use crate::websocket::session::{ActionError, SessionContext};

/// Handle a like on a chat message of the session's club. Every request counts, repeats included.
pub async fn handle_like_chat_message(id: Uuid, ctx: &SessionContext) -> Result<Broadcast, ActionError> {
    info!("Chat message like received for club {}: user={}, message={}", ctx.club_id, ctx.user_id, id);

    ctx.store
        .add_chat_message_like(ctx.club_id, id)
        .await
        .map_err(|e| like_error(e, "Chat message", "like chat message", ctx))?;

    Ok(Broadcast::LikeChatMessage { user_id: ctx.user_id, chatmessage_id: id })
}

/// Handle a like on a page comment.
pub async fn handle_like_comment(id: Uuid, ctx: &SessionContext) -> Result<Broadcast, ActionError> {
    info!("Comment like received for club {}: user={}, comment={}", ctx.club_id, ctx.user_id, id);

    ctx.store
        .add_comment_like(ctx.club_id, id)
        .await
        .map_err(|e| like_error(e, "Comment", "like comment", ctx))?;

    Ok(Broadcast::LikeComment { user_id: ctx.user_id, comment_id: id })
}

fn like_error(e: StoreError, target: &'static str, action: &'static str, ctx: &SessionContext) -> ActionError {
    match e {
        StoreError::NotFound => ActionError::NotFound(target),
        e => {
            error!("Failed to {} for club {}: {}", action, ctx.club_id, e);
            ActionError::Persistence { action, source: e }
        }
    }
}
