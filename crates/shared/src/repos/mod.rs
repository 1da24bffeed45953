use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ChatTurn;

mod conversations;
mod memory;

pub use memory::MemoryStore;

pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence for conversation lists and their turns.
///
/// Every operation is scoped to `user_id`; a conversation owned by another
/// user behaves exactly like a missing one.
pub trait ConversationRepository: Send + Sync {
    fn ping(&self) -> RepoFuture<'_, ()>;

    fn create_conversation<'a>(&'a self, user_id: Uuid, title: &'a str) -> RepoFuture<'a, Uuid>;

    fn conversation_exists(&self, user_id: Uuid, conversation_id: Uuid) -> RepoFuture<'_, bool>;

    fn append_messages<'a>(
        &'a self,
        user_id: Uuid,
        conversation_id: Uuid,
        turns: &'a [ChatTurn],
    ) -> RepoFuture<'a, ()>;

    fn list_conversations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> RepoFuture<'_, Vec<ConversationRecord>>;

    fn load_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> RepoFuture<'_, Option<Vec<ChatTurn>>>;

    fn delete_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> RepoFuture<'_, bool>;
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub fn conversation_title(original_input: &str, max_chars: usize) -> String {
    let compact = original_input.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= max_chars {
        return compact;
    }

    let truncated = compact.chars().take(max_chars).collect::<String>();
    format!("{}...", truncated.trim_end())
}
