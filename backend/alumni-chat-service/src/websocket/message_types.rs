use crate::error::AppError;
use crate::models::{MessageType, MessageView};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound WebSocket events from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsInboundEvent {
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    LeaveConversation { conversation_id: Uuid },

    /// `messageType` defaults to text. The name avoids clashing with the
    /// `type` event tag.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: Uuid,
        content: String,
        #[serde(default)]
        message_type: Option<MessageType>,
        #[serde(default)]
        client_message_id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },
}

/// Outbound WebSocket events from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsOutboundEvent {
    /// A persisted message in a room the connection has joined
    Message { message: MessageView },

    /// Personal-channel notice for a conversation the user is not viewing
    #[serde(rename_all = "camelCase")]
    ConversationUpdate {
        conversation_id: Uuid,
        last_message: MessageView,
    },

    #[serde(rename_all = "camelCase")]
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        user_name: String,
        is_typing: bool,
    },

    /// Non-fatal failure of one inbound event
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        /// Error kind: invalid_argument, not_found, forbidden, ...
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<Uuid>,
    },
}

impl WsOutboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::ConversationUpdate { .. } => "conversationUpdate",
            Self::UserTyping { .. } => "userTyping",
            Self::Error { .. } => "error",
        }
    }

    pub fn from_error(err: &AppError, conversation_id: Option<Uuid>) -> Self {
        Self::Error {
            message: err.public_message(),
            code: err.kind().to_string(),
            conversation_id,
        }
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: "invalid_argument".to_string(),
            conversation_id: None,
        }
    }

    /// JSON text frame
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, event_type = self.event_type(), "failed to serialize event");
            r#"{"type":"error","message":"internal server error","code":"internal"}"#.to_string()
        })
    }
}

impl WsInboundEvent {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id }
            | Self::SendMessage { conversation_id, .. }
            | Self::Typing { conversation_id, .. } => *conversation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_send_message_defaults() {
        let id = Uuid::new_v4();
        let raw = json!({"type": "sendMessage", "conversationId": id, "content": "hi"});
        let event: WsInboundEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            WsInboundEvent::SendMessage {
                conversation_id: id,
                content: "hi".into(),
                message_type: None,
                client_message_id: None,
            }
        );
    }

    #[test]
    fn test_parse_typing() {
        let id = Uuid::new_v4();
        let raw = json!({"type": "typing", "conversationId": id, "isTyping": true});
        let event: WsInboundEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.conversation_id(), id);
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let raw = json!({"type": "deleteMessage", "conversationId": Uuid::new_v4()});
        assert!(serde_json::from_value::<WsInboundEvent>(raw).is_err());
    }

    #[test]
    fn test_error_event_shape() {
        let event = WsOutboundEvent::from_error(
            &AppError::Forbidden("conversation is closed".into()),
            None,
        );
        let json: serde_json::Value = serde_json::from_str(&event.to_text()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "forbidden");
        assert!(json.get("conversationId").is_none());
    }

    #[test]
    fn test_user_typing_shape() {
        let event = WsOutboundEvent::UserTyping {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "Ana".into(),
            is_typing: false,
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_text()).unwrap();
        assert_eq!(json["type"], "userTyping");
        assert_eq!(json["userName"], "Ana");
        assert_eq!(json["isTyping"], false);
    }
}
