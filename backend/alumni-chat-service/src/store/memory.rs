use super::ChatStore;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationStatus, Message, Participants};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    // conversation_id -> messages in insertion order
    messages: HashMap<Uuid, Vec<Message>>,
}

/// Process-local store used by tests and `CHAT_STORE=memory`.
#[derive(Default, Clone)]
pub struct MemoryChatStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(a: &Message, b: &Message) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        seed: Option<&Message>,
    ) -> AppResult<()> {
        let mut guard = self.inner.write().await;

        if let Some(existing) = guard.conversations.values().find(|c| {
            c.status == ConversationStatus::Active && c.participants == conversation.participants
        }) {
            return Err(AppError::Conflict {
                conversation_id: existing.id,
            });
        }

        // Checked before anything is written, like a rolled back transaction
        if let Some(seed) = seed {
            if seed.conversation_id != conversation.id {
                return Err(AppError::InvalidArgument(
                    "seed message belongs to another conversation".into(),
                ));
            }
            if guard.messages.values().flatten().any(|m| m.id == seed.id) {
                return Err(AppError::Database(format!("duplicate message id {}", seed.id)));
            }
        }

        let mut stored = conversation.clone();
        let mut messages = Vec::new();
        if let Some(seed) = seed {
            stored.last_message_at = stored.last_message_at.max(seed.created_at);
            messages.push(seed.clone());
        }
        guard.messages.insert(stored.id, messages);
        guard.conversations.insert(stored.id, stored);
        Ok(())
    }

    async fn find_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.inner.read().await.conversations.get(&id).cloned())
    }

    async fn find_active_by_participants(
        &self,
        participants: &Participants,
    ) -> AppResult<Option<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard
            .conversations
            .values()
            .find(|c| c.status == ConversationStatus::Active && &c.participants == participants)
            .cloned())
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Conversation>> {
        let guard = self.inner.read().await;
        let mut list: Vec<Conversation> = guard
            .conversations
            .values()
            .filter(|c| c.status == ConversationStatus::Active && c.is_participant(user_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then(b.id.cmp(&a.id))
        });
        Ok(list
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn close_conversation(&self, id: Uuid) -> AppResult<bool> {
        let mut guard = self.inner.write().await;
        let conversation = guard
            .conversations
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))?;
        if conversation.status == ConversationStatus::Closed {
            return Ok(false);
        }
        conversation.status = ConversationStatus::Closed;
        Ok(true)
    }

    async fn touch_last_message_at(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        if let Some(conversation) = guard.conversations.get_mut(&id) {
            if at > conversation.last_message_at {
                conversation.last_message_at = at;
            }
        }
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> AppResult<(Message, bool)> {
        let mut guard = self.inner.write().await;
        if !guard.conversations.contains_key(&message.conversation_id) {
            return Err(AppError::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }
        let messages = guard.messages.entry(message.conversation_id).or_default();

        if let Some(client_id) = &message.client_message_id {
            if let Some(existing) = messages.iter().find(|m| {
                m.sender_id == message.sender_id && m.client_message_id.as_ref() == Some(client_id)
            }) {
                return Ok((existing.clone(), false));
            }
        }

        messages.push(message.clone());
        Ok((message.clone(), true))
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let mut messages = guard
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(newest_first);
        Ok(messages
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn latest_message(&self, conversation_id: Uuid) -> AppResult<Option<Message>> {
        let guard = self.inner.read().await;
        Ok(guard
            .messages
            .get(&conversation_id)
            .and_then(|messages| messages.iter().min_by(|a, b| newest_first(a, b)))
            .cloned())
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut guard = self.inner.write().await;
        let mut updated = 0;
        if let Some(messages) = guard.messages.get_mut(&conversation_id) {
            for message in messages
                .iter_mut()
                .filter(|m| m.sender_id != reader_id && !m.is_read)
            {
                message.is_read = true;
                message.read_at = Some(at);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count_unread(&self, conversation_id: Uuid, reader_id: Uuid) -> AppResult<i64> {
        let guard = self.inner.read().await;
        Ok(guard
            .messages
            .get(&conversation_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.sender_id != reader_id && !m.is_read)
                    .count() as i64
            })
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;
    use chrono::Duration;

    fn pair() -> (Uuid, Uuid, Participants) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        (a, b, Participants::new([a, b]).unwrap())
    }

    #[tokio::test]
    async fn test_second_active_conversation_conflicts() {
        let store = MemoryChatStore::new();
        let (a, _b, set) = pair();
        let first = Conversation::new(set.clone(), a, None, None);
        store.create_conversation(&first, None).await.unwrap();

        let second = Conversation::new(set, a, None, None);
        let err = store.create_conversation(&second, None).await.unwrap_err();
        assert_eq!(
            err,
            AppError::Conflict {
                conversation_id: first.id
            }
        );
    }

    #[tokio::test]
    async fn test_closed_conversation_frees_participant_set() {
        let store = MemoryChatStore::new();
        let (a, _b, set) = pair();
        let first = Conversation::new(set.clone(), a, None, None);
        store.create_conversation(&first, None).await.unwrap();
        assert!(store.close_conversation(first.id).await.unwrap());
        assert!(!store.close_conversation(first.id).await.unwrap());

        let second = Conversation::new(set, a, None, None);
        store.create_conversation(&second, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_client_message_id_returns_original() {
        let store = MemoryChatStore::new();
        let (a, _b, set) = pair();
        let conv = Conversation::new(set, a, None, None);
        store.create_conversation(&conv, None).await.unwrap();

        let first = Message::new(conv.id, a, "hi".into(), MessageType::Text, Some("c1".into()));
        let (stored, created) = store.insert_message(&first).await.unwrap();
        assert!(created);

        let retry = Message::new(conv.id, a, "hi".into(), MessageType::Text, Some("c1".into()));
        let (again, created) = store.insert_message(&retry).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, stored.id);
        assert_eq!(store.list_messages(conv.id, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_seed_leaves_no_conversation() {
        let store = MemoryChatStore::new();
        let (a, b, set) = pair();
        let existing = Conversation::new(set, a, None, None);
        store.create_conversation(&existing, None).await.unwrap();
        let (taken, _) = store
            .insert_message(&Message::new(existing.id, a, "hi".into(), MessageType::Text, None))
            .await
            .unwrap();

        let other = Participants::new([a, b, Uuid::new_v4()]).unwrap();
        let conv = Conversation::new(other.clone(), a, None, None);
        let mut seed = Message::new(conv.id, a, "seed".into(), MessageType::System, None);
        seed.id = taken.id;

        let err = store.create_conversation(&conv, Some(&seed)).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert!(store.find_conversation(conv.id).await.unwrap().is_none());
        assert!(store.find_active_by_participants(&other).await.unwrap().is_none());
        assert!(store.list_messages(conv.id, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_does_not_restamp() {
        let store = MemoryChatStore::new();
        let (a, b, set) = pair();
        let conv = Conversation::new(set, a, None, None);
        store.create_conversation(&conv, None).await.unwrap();
        store
            .insert_message(&Message::new(conv.id, a, "one".into(), MessageType::Text, None))
            .await
            .unwrap();

        let first_at = Utc::now();
        assert_eq!(store.mark_read(conv.id, b, first_at).await.unwrap(), 1);
        let later = first_at + Duration::seconds(30);
        assert_eq!(store.mark_read(conv.id, b, later).await.unwrap(), 0);

        let messages = store.list_messages(conv.id, 10, 0).await.unwrap();
        assert_eq!(messages[0].read_at, Some(first_at));
        assert_eq!(store.count_unread(conv.id, b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_touch_is_monotonic() {
        let store = MemoryChatStore::new();
        let (a, _b, set) = pair();
        let conv = Conversation::new(set, a, None, None);
        store.create_conversation(&conv, None).await.unwrap();

        let earlier = conv.last_message_at - Duration::minutes(5);
        store.touch_last_message_at(conv.id, earlier).await.unwrap();
        let found = store.find_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(found.last_message_at, conv.last_message_at);
    }
}
