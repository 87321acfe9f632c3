//! Durable storage for conversations and messages.
//!
//! [`ChatStore`] is the single mutation point for chat state. The realtime
//! gateway never caches membership from here; it re-reads on every
//! room-scoped operation.

mod memory;
mod postgres;

pub use memory::MemoryChatStore;
pub use postgres::PgChatStore;

use crate::error::AppResult;
use crate::models::{Conversation, Message, Participants};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist a new conversation and, in the same unit of work, its optional
    /// seed message. Fails with `Conflict` if an active conversation with the
    /// same participant set already exists.
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        seed: Option<&Message>,
    ) -> AppResult<()>;

    async fn find_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn find_active_by_participants(
        &self,
        participants: &Participants,
    ) -> AppResult<Option<Conversation>>;

    /// Active conversations containing `user_id`, most recent activity first
    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Conversation>>;

    /// Transition active -> closed. Returns `false` when already closed.
    async fn close_conversation(&self, id: Uuid) -> AppResult<bool>;

    /// Move `last_message_at` forward to `at`; never moves it backwards.
    async fn touch_last_message_at(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    /// Insert a message. When the message carries a client message id that the
    /// same sender already used in this conversation, the stored message is
    /// returned with `false` and nothing is written.
    async fn insert_message(&self, message: &Message) -> AppResult<(Message, bool)>;

    /// Messages newest first, ties broken by id
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>>;

    async fn latest_message(&self, conversation_id: Uuid) -> AppResult<Option<Message>>;

    /// Mark every unread message not sent by `reader_id` as read at `at`.
    /// Already-read messages keep their original `read_at`.
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64>;

    async fn count_unread(&self, conversation_id: Uuid, reader_id: Uuid) -> AppResult<i64>;
}
