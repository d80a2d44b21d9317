use tracing::{error, info};

use crate::models::{Broadcast, CommentCreate, NewComment};
use crate::websocket::session::{ActionError, SessionContext};

/// Handle a page comment. Owner and club always come from the session.
pub async fn handle_comment(comment: NewComment, ctx: &SessionContext) -> Result<Broadcast, ActionError> {
    info!(
        "Comment received for club {}: user={}, page={}, reply={}",
        ctx.club_id,
        ctx.user_id,
        comment.page_no,
        comment.parent_id.is_some()
    );

    let create = CommentCreate {
        club_id: ctx.club_id,
        user_id: ctx.user_id,
        parent_id: comment.parent_id,
        page_no: comment.page_no,
        message: comment.message,
    };

    let stored = ctx.store.create_comment(create).await.map_err(|e| {
        error!("Failed to save comment for club {}: {}", ctx.club_id, e);
        ActionError::Persistence { action: "save comment", source: e }
    })?;

    Ok(Broadcast::Comment { user_id: ctx.user_id, data: stored })
}
