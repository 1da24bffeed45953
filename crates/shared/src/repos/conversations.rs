use sqlx::Row;
use uuid::Uuid;

use crate::models::{ChatTurn, TurnRole};

use super::{ConversationRecord, ConversationRepository, RepoFuture, Store, StoreError};

impl ConversationRepository for Store {
    fn ping(&self) -> RepoFuture<'_, ()> {
        Box::pin(async move {
            let _: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
            Ok(())
        })
    }

    fn create_conversation<'a>(&'a self, user_id: Uuid, title: &'a str) -> RepoFuture<'a, Uuid> {
        Box::pin(async move {
            let conversation_id: Uuid = sqlx::query_scalar(
                "INSERT INTO conversations (user_id, title)
                 VALUES ($1, $2)
                 RETURNING id",
            )
            .bind(user_id)
            .bind(title)
            .fetch_one(&self.pool)
            .await?;

            Ok(conversation_id)
        })
    }

    fn conversation_exists(&self, user_id: Uuid, conversation_id: Uuid) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (
                    SELECT 1 FROM conversations WHERE id = $1 AND user_id = $2
                 )",
            )
            .bind(conversation_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

            Ok(exists)
        })
    }

    fn append_messages<'a>(
        &'a self,
        user_id: Uuid,
        conversation_id: Uuid,
        turns: &'a [ChatTurn],
    ) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let touched = sqlx::query(
                "UPDATE conversations
                 SET updated_at = NOW()
                 WHERE id = $1
                   AND user_id = $2",
            )
            .bind(conversation_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
            if touched.rows_affected() == 0 {
                return Err(StoreError::ConversationNotFound);
            }

            for turn in turns {
                sqlx::query(
                    "INSERT INTO conversation_messages (conversation_id, role, content)
                     VALUES ($1, $2, $3)",
                )
                .bind(conversation_id)
                .bind(turn.role.as_str())
                .bind(&turn.content)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        })
    }

    fn list_conversations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> RepoFuture<'_, Vec<ConversationRecord>> {
        Box::pin(async move {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = sqlx::query(
                "SELECT id, title, created_at, updated_at
                 FROM conversations
                 WHERE user_id = $1
                 ORDER BY updated_at DESC, id DESC
                 LIMIT $2",
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(|row| {
                    Ok(ConversationRecord {
                        id: row.try_get("id")?,
                        title: row.try_get("title")?,
                        created_at: row.try_get("created_at")?,
                        updated_at: row.try_get("updated_at")?,
                    })
                })
                .collect()
        })
    }

    fn load_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> RepoFuture<'_, Option<Vec<ChatTurn>>> {
        Box::pin(async move {
            if !self.conversation_exists(user_id, conversation_id).await? {
                return Ok(None);
            }

            let rows = sqlx::query(
                "SELECT role, content
                 FROM conversation_messages
                 WHERE conversation_id = $1
                 ORDER BY id ASC",
            )
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?;

            let turns = rows
                .into_iter()
                .map(|row| {
                    let role_raw: String = row.try_get("role")?;
                    let role = role_raw
                        .parse::<TurnRole>()
                        .map_err(StoreError::InvalidData)?;
                    Ok(ChatTurn {
                        role,
                        content: row.try_get("content")?,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;

            Ok(Some(turns))
        })
    }

    fn delete_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            let deleted = sqlx::query(
                "DELETE FROM conversations
                 WHERE id = $1
                   AND user_id = $2",
            )
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

            Ok(deleted.rows_affected() > 0)
        })
    }
}
