use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::ChatTurn;

use super::{ConversationRecord, ConversationRepository, RepoFuture, StoreError};

/// Process-local conversation store used when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<Uuid, StoredConversation>>,
}

struct StoredConversation {
    user_id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    turns: Vec<ChatTurn>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, StoredConversation>>, StoreError> {
        self.conversations
            .lock()
            .map_err(|_| StoreError::InvalidData("memory store lock poisoned".to_string()))
    }
}

impl ConversationRepository for MemoryStore {
    fn ping(&self) -> RepoFuture<'_, ()> {
        Box::pin(async move {
            self.lock()?;
            Ok(())
        })
    }

    fn create_conversation<'a>(&'a self, user_id: Uuid, title: &'a str) -> RepoFuture<'a, Uuid> {
        Box::pin(async move {
            let now = Utc::now();
            let conversation_id = Uuid::new_v4();
            self.lock()?.insert(
                conversation_id,
                StoredConversation {
                    user_id,
                    title: title.to_string(),
                    created_at: now,
                    updated_at: now,
                    turns: Vec::new(),
                },
            );
            Ok(conversation_id)
        })
    }

    fn conversation_exists(&self, user_id: Uuid, conversation_id: Uuid) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            Ok(self
                .lock()?
                .get(&conversation_id)
                .is_some_and(|conversation| conversation.user_id == user_id))
        })
    }

    fn append_messages<'a>(
        &'a self,
        user_id: Uuid,
        conversation_id: Uuid,
        turns: &'a [ChatTurn],
    ) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let mut conversations = self.lock()?;
            let conversation = conversations
                .get_mut(&conversation_id)
                .filter(|conversation| conversation.user_id == user_id)
                .ok_or(StoreError::ConversationNotFound)?;

            conversation.turns.extend_from_slice(turns);
            conversation.updated_at = Utc::now().max(conversation.updated_at);
            Ok(())
        })
    }

    fn list_conversations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> RepoFuture<'_, Vec<ConversationRecord>> {
        Box::pin(async move {
            let conversations = self.lock()?;
            let mut records = conversations
                .iter()
                .filter(|(_, conversation)| conversation.user_id == user_id)
                .map(|(id, conversation)| ConversationRecord {
                    id: *id,
                    title: conversation.title.clone(),
                    created_at: conversation.created_at,
                    updated_at: conversation.updated_at,
                })
                .collect::<Vec<_>>();

            records.sort_by(|left, right| {
                right
                    .updated_at
                    .cmp(&left.updated_at)
                    .then_with(|| right.id.cmp(&left.id))
            });
            records.truncate(limit);
            Ok(records)
        })
    }

    fn load_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> RepoFuture<'_, Option<Vec<ChatTurn>>> {
        Box::pin(async move {
            Ok(self
                .lock()?
                .get(&conversation_id)
                .filter(|conversation| conversation.user_id == user_id)
                .map(|conversation| conversation.turns.clone()))
        })
    }

    fn delete_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            let mut conversations = self.lock()?;
            let owned = conversations
                .get(&conversation_id)
                .is_some_and(|conversation| conversation.user_id == user_id);
            if owned {
                conversations.remove(&conversation_id);
            }
            Ok(owned)
        })
    }
}
