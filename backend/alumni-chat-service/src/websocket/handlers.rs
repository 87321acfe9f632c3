use super::{events, ConnectionId, ConnectionRegistry, WsInboundEvent, WsOutboundEvent};
use crate::error::AppResult;
use crate::models::UserProfile;
use crate::services::ConversationService;
use tracing::debug;
use uuid::Uuid;

/// Per-event logic of the realtime gateway, independent of the transport.
///
/// Every room-scoped event re-checks authorization against persisted state;
/// having joined a room earlier grants nothing. Failures are reported to the
/// originating connection as `error` events and never close it.
#[derive(Clone)]
pub struct Gateway {
    service: ConversationService,
    registry: ConnectionRegistry,
}

impl Gateway {
    pub fn new(service: ConversationService, registry: ConnectionRegistry) -> Self {
        Self { service, registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub async fn handle(&self, conn: ConnectionId, user: &UserProfile, event: WsInboundEvent) {
        let conversation_id = event.conversation_id();
        let result = match event {
            WsInboundEvent::JoinConversation { conversation_id } => {
                self.join(conn, user, conversation_id).await
            }
            WsInboundEvent::LeaveConversation { conversation_id } => {
                self.registry.leave(conn, conversation_id).await;
                Ok(())
            }
            WsInboundEvent::SendMessage {
                conversation_id,
                content,
                message_type,
                client_message_id,
            } => {
                self.send(
                    conn,
                    user,
                    conversation_id,
                    &content,
                    message_type.unwrap_or_default(),
                    client_message_id,
                )
                .await
            }
            WsInboundEvent::Typing {
                conversation_id,
                is_typing,
            } => self.typing(conn, user, conversation_id, is_typing).await,
        };

        if let Err(e) = result {
            debug!(
                connection_id = %conn,
                user_id = %user.id,
                conversation_id = %conversation_id,
                error = %e,
                "realtime event rejected"
            );
            let payload = WsOutboundEvent::from_error(&e, Some(conversation_id)).to_text();
            self.registry.send_to_connection(conn, &payload).await;
        }
    }

    async fn join(&self, conn: ConnectionId, user: &UserProfile, conversation_id: Uuid) -> AppResult<()> {
        self.service
            .conversation_for_member(user.id, conversation_id)
            .await?;
        self.registry.join(conn, conversation_id).await;
        Ok(())
    }

    async fn send(
        &self,
        conn: ConnectionId,
        user: &UserProfile,
        conversation_id: Uuid,
        content: &str,
        message_type: crate::models::MessageType,
        client_message_id: Option<String>,
    ) -> AppResult<()> {
        let outcome = self
            .service
            .append_message(user, conversation_id, content, message_type, client_message_id)
            .await?;

        if outcome.created {
            events::publish_message(&self.registry, &outcome.conversation, &outcome.message).await;
        } else {
            // Already accepted earlier: confirm to the sender only
            let payload = WsOutboundEvent::Message {
                message: outcome.message,
            }
            .to_text();
            self.registry.send_to_connection(conn, &payload).await;
        }
        Ok(())
    }

    async fn typing(
        &self,
        conn: ConnectionId,
        user: &UserProfile,
        conversation_id: Uuid,
        is_typing: bool,
    ) -> AppResult<()> {
        self.service
            .conversation_for_member(user.id, conversation_id)
            .await?;
        let payload = WsOutboundEvent::UserTyping {
            conversation_id,
            user_id: user.id,
            user_name: user.name.clone(),
            is_typing,
        }
        .to_text();
        self.registry
            .broadcast_to_room(conversation_id, &payload, Some(conn))
            .await;
        Ok(())
    }

    /// Drop the connection from every room and its personal channel.
    /// Peers are not told; presence is implicit.
    pub async fn disconnect(&self, conn: ConnectionId) {
        self.registry.unregister(conn).await;
    }
}
