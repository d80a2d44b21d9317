use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ChatMessage, Club, Comment, CommentCreate};

/// Longest chat message the store accepts, in characters.
pub const MAX_STORED_MESSAGE_LEN: usize = 150;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable storage for clubs, memberships, chat messages and comments.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_chat_message(
        &self,
        user_id: Uuid,
        club_id: Uuid,
        message: &str,
    ) -> Result<ChatMessage, StoreError>;

    async fn create_comment(&self, comment: CommentCreate) -> Result<Comment, StoreError>;

    /// Increment the like counter of a chat message posted in `club_id`.
    async fn add_chat_message_like(&self, club_id: Uuid, id: Uuid) -> Result<(), StoreError>;

    /// Increment the like counter of a comment posted in `club_id`.
    async fn add_comment_like(&self, club_id: Uuid, id: Uuid) -> Result<(), StoreError>;

    async fn get_club(&self, club_id: Uuid) -> Result<Option<Club>, StoreError>;

    async fn get_club_member_ids(&self, club_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    /// Chat history of a club, oldest first.
    async fn get_chat_messages(&self, club_id: Uuid) -> Result<Vec<ChatMessage>, StoreError>;

    /// Comments of a club, oldest first.
    async fn get_comments(&self, club_id: Uuid) -> Result<Vec<Comment>, StoreError>;
}

pub(crate) fn check_message_len(message: &str) -> Result<(), StoreError> {
    if message.chars().count() > MAX_STORED_MESSAGE_LEN {
        return Err(StoreError::Validation("max string length".to_string()));
    }
    Ok(())
}
