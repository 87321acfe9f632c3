//! Client-facing payloads.
//!
//! These are the shapes returned over HTTP and pushed over the realtime
//! channel. Participant display fields come from the identity service and are
//! best-effort: when a lookup fails the view degrades to the bare user id.

use super::{Conversation, ConversationStatus, Message, MessageType, Role, UserProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl ParticipantView {
    pub fn id_only(id: Uuid) -> Self {
        Self {
            id,
            name: None,
            email: None,
            avatar: None,
            role: None,
        }
    }

    pub fn resolve(id: Uuid, users: &HashMap<Uuid, UserProfile>) -> Self {
        users.get(&id).map(Self::from).unwrap_or_else(|| Self::id_only(id))
    }
}

impl From<&UserProfile> for ParticipantView {
    fn from(user: &UserProfile) -> Self {
        Self {
            id: user.id,
            name: Some(user.name.clone()),
            email: Some(user.email.clone()),
            avatar: user.avatar.clone(),
            role: Some(user.role),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: ParticipantView,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn build(message: &Message, users: &HashMap<Uuid, UserProfile>) -> Self {
        Self::with_sender(message, ParticipantView::resolve(message.sender_id, users))
    }

    pub fn with_sender(message: &Message, sender: ParticipantView) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender,
            content: message.content.clone(),
            message_type: message.message_type,
            client_message_id: message.client_message_id.clone(),
            is_read: message.is_read,
            read_at: message.read_at,
            created_at: message.created_at,
        }
    }

    /// Copy for recipients other than the sender, who have no pending entry
    /// to settle
    pub fn without_client_id(&self) -> Self {
        Self {
            client_message_id: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    pub participants: Vec<ParticipantView>,
    pub initiated_by: Uuid,
    pub job_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub status: ConversationStatus,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_message: Option<MessageView>,
    #[serde(default)]
    pub unread_count: i64,
}

impl ConversationView {
    pub fn build(conversation: &Conversation, users: &HashMap<Uuid, UserProfile>) -> Self {
        Self {
            id: conversation.id,
            participants: conversation
                .participants
                .iter()
                .map(|id| ParticipantView::resolve(*id, users))
                .collect(),
            initiated_by: conversation.initiated_by,
            job_id: conversation.job_id,
            application_id: conversation.application_id,
            status: conversation.status,
            last_message_at: conversation.last_message_at,
            created_at: conversation.created_at,
            last_message: None,
            unread_count: 0,
        }
    }

    pub fn with_last_message(mut self, last_message: Option<MessageView>) -> Self {
        self.last_message = last_message;
        self
    }

    pub fn with_unread_count(mut self, unread_count: i64) -> Self {
        self.unread_count = unread_count;
        self
    }
}
