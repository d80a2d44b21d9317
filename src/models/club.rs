use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{ChatMessage, Club, Comment};

/// Everything a member needs when joining a club, fetched once before
/// switching to the relay.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ClubHistoryResponse {
    pub club: Club,
    /// Member ids
    pub members: Vec<Uuid>,
    pub chat: Vec<ChatMessage>,
    pub comments: Vec<Comment>,
}
