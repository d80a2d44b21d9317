use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub club_id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub likes: i32,
    pub created_at: DateTime<Utc>,
}

/// A persisted page comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub club_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub user_id: Uuid,
    pub page_no: i32,
    pub message: String,
    pub likes: i32,
    pub created_at: DateTime<Utc>,
}

/// A comment ready to be persisted. Owner and club are always set server side.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentCreate {
    pub club_id: Uuid,
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub page_no: i32,
    pub message: String,
}

/// A club (reading room)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Club {
    pub id: Uuid,
    pub club_name: String,
    pub club_pic: String,
    pub file_url: String,
    pub page_no: i32,
    pub host_id: Option<Uuid>,
    pub page_sync: bool,
    pub private: bool,
}
