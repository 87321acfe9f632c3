use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum message length in code points, measured after trimming.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Longest accepted client-generated message id.
pub const MAX_CLIENT_MESSAGE_ID_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    System,
}

impl MessageType {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// For system messages, the user whose action produced the message
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub client_message_id: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: MessageType,
        client_message_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            message_type,
            client_message_id,
            is_read: false,
            read_at: None,
            created_at: super::now(),
        }
    }

    /// Trim and bound message content.
    pub fn validate_content(raw: &str) -> Result<String, AppError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidArgument(
                "message content must not be empty".into(),
            ));
        }
        if trimmed.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::InvalidArgument(format!(
                "message content exceeds {} characters",
                MAX_CONTENT_CHARS
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Normalize an optional client message id; blank ids are treated as absent.
    pub fn validate_client_message_id(raw: Option<String>) -> Result<Option<String>, AppError> {
        match raw.map(|s| s.trim().to_string()) {
            None => Ok(None),
            Some(id) if id.is_empty() => Ok(None),
            Some(id) if id.len() > MAX_CLIENT_MESSAGE_ID_LEN => Err(AppError::InvalidArgument(
                format!("clientMessageId exceeds {} bytes", MAX_CLIENT_MESSAGE_ID_LEN),
            )),
            Some(id) => Ok(Some(id)),
        }
    }
}
