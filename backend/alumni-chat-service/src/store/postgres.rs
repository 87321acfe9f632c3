use super::ChatStore;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationStatus, Message, MessageType, Participants};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, participant_ids, initiated_by, job_id, application_id, \
     status, last_message_at, created_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, message_type, \
     client_message_id, is_read, read_at, created_at";

/// `ChatStore` over deadpool-postgres
#[derive(Clone)]
pub struct PgChatStore {
    pool: Pool,
}

impl PgChatStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(e: &tokio_postgres::Error) -> bool {
    e.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

fn conversation_from_row(row: &Row) -> AppResult<Conversation> {
    let ids: Vec<Uuid> = row.get("participant_ids");
    let participants = Participants::new(ids)
        .map_err(|e| AppError::Database(format!("corrupt participant set: {e}")))?;
    let status: String = row.get("status");
    let status = ConversationStatus::from_db(&status)
        .ok_or_else(|| AppError::Database(format!("unknown conversation status '{status}'")))?;

    Ok(Conversation {
        id: row.get("id"),
        participants,
        initiated_by: row.get("initiated_by"),
        job_id: row.get("job_id"),
        application_id: row.get("application_id"),
        status,
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
    })
}

fn message_from_row(row: &Row) -> AppResult<Message> {
    let message_type: String = row.get("message_type");
    let message_type = MessageType::from_db(&message_type)
        .ok_or_else(|| AppError::Database(format!("unknown message type '{message_type}'")))?;

    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        message_type,
        client_message_id: row.get("client_message_id"),
        is_read: row.get("is_read"),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        seed: Option<&Message>,
    ) -> AppResult<()> {
        if seed.is_some_and(|m| m.conversation_id != conversation.id) {
            return Err(AppError::InvalidArgument(
                "seed message belongs to another conversation".into(),
            ));
        }
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let last_message_at = seed
            .map(|m| m.created_at.max(conversation.last_message_at))
            .unwrap_or(conversation.last_message_at);

        let inserted = tx
            .execute(
                "INSERT INTO conversations \
                 (id, participant_ids, participant_key, initiated_by, job_id, application_id, \
                  status, last_message_at, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &conversation.id,
                    &conversation.participants.ids(),
                    &conversation.participants.key(),
                    &conversation.initiated_by,
                    &conversation.job_id,
                    &conversation.application_id,
                    &conversation.status.to_db(),
                    &last_message_at,
                    &conversation.created_at,
                ],
            )
            .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                drop(tx);
                let existing = self
                    .find_active_by_participants(&conversation.participants)
                    .await?;
                return Err(match existing {
                    Some(c) => AppError::Conflict {
                        conversation_id: c.id,
                    },
                    None => AppError::Database(e.to_string()),
                });
            }
            return Err(e.into());
        }

        if let Some(seed) = seed {
            tx.execute(
                "INSERT INTO messages \
                 (id, conversation_id, sender_id, content, message_type, client_message_id, \
                  is_read, read_at, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, FALSE, NULL, $7)",
                &[
                    &seed.id,
                    &seed.conversation_id,
                    &seed.sender_id,
                    &seed.content,
                    &seed.message_type.to_db(),
                    &seed.client_message_id,
                    &seed.created_at,
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
        client
            .query_opt(sql.as_str(), &[&id])
            .await?
            .as_ref()
            .map(conversation_from_row)
            .transpose()
    }

    async fn find_active_by_participants(
        &self,
        participants: &Participants,
    ) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE participant_key = $1 AND status = 'active'"
        );
        client
            .query_opt(sql.as_str(), &[&participants.key()])
            .await?
            .as_ref()
            .map(conversation_from_row)
            .transpose()
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Conversation>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE participant_ids @> ARRAY[$1::uuid] AND status = 'active' \
             ORDER BY last_message_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        let rows = client.query(sql.as_str(), &[&user_id, &limit, &offset]).await?;
        rows.iter().map(conversation_from_row).collect()
    }

    async fn close_conversation(&self, id: Uuid) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE conversations SET status = 'closed', updated_at = NOW() \
                 WHERE id = $1 AND status = 'active'",
                &[&id],
            )
            .await?;
        if updated > 0 {
            return Ok(true);
        }
        let exists = client
            .query_opt("SELECT 1 FROM conversations WHERE id = $1", &[&id])
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("conversation {id}"))),
        }
    }

    async fn touch_last_message_at(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE conversations \
                 SET last_message_at = GREATEST(last_message_at, $2), updated_at = NOW() \
                 WHERE id = $1",
                &[&id, &at],
            )
            .await?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> AppResult<(Message, bool)> {
        let client = self.pool.get().await?;
        let sql = format!(
            "INSERT INTO messages \
             (id, conversation_id, sender_id, content, message_type, client_message_id, \
              is_read, read_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE, NULL, $7) \
             ON CONFLICT (conversation_id, sender_id, client_message_id) \
                 WHERE client_message_id IS NOT NULL DO NOTHING \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let row = client
            .query_opt(
                sql.as_str(),
                &[
                    &message.id,
                    &message.conversation_id,
                    &message.sender_id,
                    &message.content,
                    &message.message_type.to_db(),
                    &message.client_message_id,
                    &message.created_at,
                ],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
                    AppError::NotFound(format!("conversation {}", message.conversation_id))
                } else {
                    AppError::from(e)
                }
            })?;

        if let Some(row) = row {
            return Ok((message_from_row(&row)?, true));
        }

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND sender_id = $2 AND client_message_id = $3"
        );
        let existing = client
            .query_one(
                sql.as_str(),
                &[
                    &message.conversation_id,
                    &message.sender_id,
                    &message.client_message_id,
                ],
            )
            .await?;
        Ok((message_from_row(&existing)?, false))
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        let rows = client
            .query(sql.as_str(), &[&conversation_id, &limit, &offset])
            .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn latest_message(&self, conversation_id: Uuid) -> AppResult<Option<Message>> {
        Ok(self
            .list_messages(conversation_id, 1, 0)
            .await?
            .into_iter()
            .next())
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE messages SET is_read = TRUE, read_at = $3 \
                 WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
                &[&conversation_id, &reader_id, &at],
            )
            .await?;
        Ok(updated)
    }

    async fn count_unread(&self, conversation_id: Uuid, reader_id: Uuid) -> AppResult<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM messages \
                 WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
                &[&conversation_id, &reader_id],
            )
            .await?;
        Ok(row.get(0))
    }
}
