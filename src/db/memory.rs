use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::store::{check_message_len, Store, StoreError};
use crate::models::{ChatMessage, Club, Comment, CommentCreate};

#[derive(Default)]
struct Tables {
    clubs: HashMap<Uuid, Club>,
    members: HashMap<Uuid, Vec<Uuid>>,
    chat_messages: Vec<ChatMessage>,
    comments: Vec<Comment>,
}

/// In-process store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a club. The host becomes its first member.
    pub async fn insert_club(&self, club: Club) {
        let mut tables = self.tables.write().await;
        if let Some(host_id) = club.host_id {
            let members = tables.members.entry(club.id).or_default();
            if !members.contains(&host_id) {
                members.push(host_id);
            }
        }
        debug!(club_id = %club.id, "Club inserted");
        tables.clubs.insert(club.id, club);
    }

    pub async fn add_member(&self, club_id: Uuid, user_id: Uuid) {
        let mut tables = self.tables.write().await;
        let members = tables.members.entry(club_id).or_default();
        if !members.contains(&user_id) {
            members.push(user_id);
        }
    }

    pub async fn chat_message(&self, id: Uuid) -> Option<ChatMessage> {
        let tables = self.tables.read().await;
        tables.chat_messages.iter().find(|m| m.id == id).cloned()
    }

    pub async fn comment(&self, id: Uuid) -> Option<Comment> {
        let tables = self.tables.read().await;
        tables.comments.iter().find(|c| c.id == id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_chat_message(
        &self,
        user_id: Uuid,
        club_id: Uuid,
        message: &str,
    ) -> Result<ChatMessage, StoreError> {
        check_message_len(message)?;
        let chat_message = ChatMessage {
            id: Uuid::new_v4(),
            club_id,
            user_id,
            message: message.to_string(),
            likes: 0,
            created_at: Utc::now(),
        };
        self.tables.write().await.chat_messages.push(chat_message.clone());
        Ok(chat_message)
    }

    async fn create_comment(&self, comment: CommentCreate) -> Result<Comment, StoreError> {
        let comment = Comment {
            id: Uuid::new_v4(),
            club_id: comment.club_id,
            parent_id: comment.parent_id,
            user_id: comment.user_id,
            page_no: comment.page_no,
            message: comment.message,
            likes: 0,
            created_at: Utc::now(),
        };
        self.tables.write().await.comments.push(comment.clone());
        Ok(comment)
    }

    async fn add_chat_message_like(&self, club_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let message = tables
            .chat_messages
            .iter_mut()
            .find(|m| m.id == id && m.club_id == club_id)
            .ok_or(StoreError::NotFound)?;
        message.likes += 1;
        Ok(())
    }

    async fn add_comment_like(&self, club_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let comment = tables
            .comments
            .iter_mut()
            .find(|c| c.id == id && c.club_id == club_id)
            .ok_or(StoreError::NotFound)?;
        comment.likes += 1;
        Ok(())
    }

    async fn get_club(&self, club_id: Uuid) -> Result<Option<Club>, StoreError> {
        Ok(self.tables.read().await.clubs.get(&club_id).cloned())
    }

    async fn get_club_member_ids(&self, club_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.members.get(&club_id).cloned().unwrap_or_default())
    }

    async fn get_chat_messages(&self, club_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .chat_messages
            .iter()
            .filter(|m| m.club_id == club_id)
            .cloned()
            .collect())
    }

    async fn get_comments(&self, club_id: Uuid) -> Result<Vec<Comment>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.club_id == club_id)
            .cloned()
            .collect())
    }
}
