use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use super::store::{check_message_len, Store, StoreError};
use crate::models::{ChatMessage, Club, Comment, CommentCreate};

const SCHEMA: &[&str] = &[
    r#"CREATE EXTENSION IF NOT EXISTS "uuid-ossp""#,
    r#"
    CREATE TABLE IF NOT EXISTS clubs (
        id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
        club_name TEXT NOT NULL,
        club_pic TEXT NOT NULL DEFAULT '',
        file_url TEXT NOT NULL,
        page_no INTEGER NOT NULL DEFAULT 0,
        host_id UUID,
        page_sync BOOLEAN NOT NULL DEFAULT FALSE,
        private BOOLEAN NOT NULL DEFAULT FALSE
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS club_users (
        id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
        club_id UUID NOT NULL REFERENCES clubs (id) ON DELETE CASCADE,
        user_id UUID NOT NULL,
        UNIQUE (club_id, user_id)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
        club_id UUID NOT NULL REFERENCES clubs (id) ON DELETE CASCADE,
        user_id UUID NOT NULL,
        message TEXT NOT NULL,
        likes INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
        club_id UUID NOT NULL REFERENCES clubs (id) ON DELETE CASCADE,
        parent_id UUID,
        user_id UUID NOT NULL,
        page_no INTEGER NOT NULL,
        message TEXT NOT NULL,
        likes INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS chat_messages_club_idx ON chat_messages (club_id, created_at)"#,
    r#"CREATE INDEX IF NOT EXISTS comments_club_idx ON comments (club_id, created_at)"#,
];

/// PostgreSQL backed store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create the tables if they do not exist yet. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), SqlxError> {
        info!("Running database migrations");
        for statement in SCHEMA.iter().copied() {
            if let Err(e) = sqlx::query(statement).execute(&self.pool).await {
                error!("Migration statement failed: {}", e);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_chat_message(
        &self,
        user_id: Uuid,
        club_id: Uuid,
        message: &str,
    ) -> Result<ChatMessage, StoreError> {
        check_message_len(message)?;
        let row = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (club_id, user_id, message)
            VALUES ($1, $2, $3)
            RETURNING id, club_id, user_id, message, likes, created_at
            "#,
        )
        .bind(club_id)
        .bind(user_id)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_comment(&self, comment: CommentCreate) -> Result<Comment, StoreError> {
        let row = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (club_id, parent_id, user_id, page_no, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, club_id, parent_id, user_id, page_no, message, likes, created_at
            "#,
        )
        .bind(comment.club_id)
        .bind(comment.parent_id)
        .bind(comment.user_id)
        .bind(comment.page_no)
        .bind(&comment.message)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn add_chat_message_like(&self, club_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, Uuid>(
            "UPDATE chat_messages SET likes = likes + 1 WHERE id = $1 AND club_id = $2 RETURNING id",
        )
        .bind(id)
        .bind(club_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|_| ())
        .ok_or(StoreError::NotFound)
    }

    async fn add_comment_like(&self, club_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, Uuid>(
            "UPDATE comments SET likes = likes + 1 WHERE id = $1 AND club_id = $2 RETURNING id",
        )
        .bind(id)
        .bind(club_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|_| ())
        .ok_or(StoreError::NotFound)
    }

    async fn get_club(&self, club_id: Uuid) -> Result<Option<Club>, StoreError> {
        let club = sqlx::query_as::<_, Club>(
            r#"
            SELECT id, club_name, club_pic, file_url, page_no, host_id, page_sync, private
            FROM clubs
            WHERE id = $1
            "#,
        )
        .bind(club_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(club)
    }

    async fn get_club_member_ids(&self, club_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let members = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM club_users WHERE club_id = $1",
        )
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn get_chat_messages(&self, club_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, club_id, user_id, message, likes, created_at
            FROM chat_messages
            WHERE club_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_comments(&self, club_id: Uuid) -> Result<Vec<Comment>, StoreError> {
        let rows = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, club_id, parent_id, user_id, page_no, message, likes, created_at
            FROM comments
            WHERE club_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
