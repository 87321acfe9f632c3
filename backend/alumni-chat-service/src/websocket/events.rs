//! Fan-out of accepted messages.

use super::{ConnectionRegistry, WsOutboundEvent};
use crate::models::{Conversation, MessageView};
use tracing::debug;

/// Push a newly persisted message.
///
/// Every connection joined to the conversation room gets a `message` event,
/// the sender's own connections included. Participants with no connection in
/// the room get a `conversationUpdate` on their personal channel instead. Only
/// the sender's copies carry the `clientMessageId`.
pub async fn publish_message(
    registry: &ConnectionRegistry,
    conversation: &Conversation,
    message: &MessageView,
) {
    let sender_id = message.sender.id;
    let public = message.without_client_id();

    let own = WsOutboundEvent::Message {
        message: message.clone(),
    }
    .to_text();
    let others = WsOutboundEvent::Message {
        message: public.clone(),
    }
    .to_text();
    let in_room = registry
        .broadcast_to_room_split(conversation.id, sender_id, &own, &others)
        .await;

    let viewing = registry.users_in_room(conversation.id).await;
    let mut notified = 0;
    for participant in conversation.participants.iter() {
        if viewing.contains(participant) {
            continue;
        }
        let last_message = if *participant == sender_id {
            message.clone()
        } else {
            public.clone()
        };
        let update = WsOutboundEvent::ConversationUpdate {
            conversation_id: conversation.id,
            last_message,
        }
        .to_text();
        notified += registry.send_to_user(*participant, &update).await;
    }

    debug!(
        conversation_id = %conversation.id,
        message_id = %message.id,
        in_room,
        notified,
        "message fanned out"
    );
}
