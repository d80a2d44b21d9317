use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::{error_response, ClubHistoryResponse, ErrorResponse};
use crate::routes::AuthUser;
use crate::state::AppState;

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn internal(e: impl std::fmt::Display) -> HandlerError {
    error!("Failed to load club history: {}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
}

/// Club details with its chat and comment history, for members only.
pub async fn club_history(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(club_id): Path<String>,
) -> Result<(StatusCode, Json<ClubHistoryResponse>), HandlerError> {
    let not_found = || error_response(StatusCode::NOT_FOUND, AuthError::ClubNotFound.to_string());

    let club_id = Uuid::parse_str(&club_id).map_err(|_| not_found())?;
    let club = state
        .store
        .get_club(club_id)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;

    let members = state.store.get_club_member_ids(club_id).await.map_err(internal)?;
    if !members.contains(&user_id) {
        let err = AuthError::NotMember;
        return Err(error_response(err.status(), err.to_string()));
    }

    let chat = state.store.get_chat_messages(club_id).await.map_err(internal)?;
    let comments = state.store.get_comments(club_id).await.map_err(internal)?;

    info!(
        "Club history served for club {}: user={}, messages={}, comments={}",
        club_id,
        user_id,
        chat.len(),
        comments.len()
    );

    Ok((
        StatusCode::OK,
        Json(ClubHistoryResponse {
            club,
            members,
            chat,
            comments,
        }),
    ))
}
