//! Client-side view state.
//!
//! History pages fetched over HTTP and events pushed over the socket arrive
//! in any order and may overlap. Everything here is keyed by message id so
//! the same message applied twice renders once.

use super::connection::ClientEvent;
use super::reconnect::ConnectionStatus;
use super::typing::TypingIndicators;
use crate::models::{ConversationView, MessageView};
use crate::websocket::message_types::WsOutboundEvent;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// Window for collapsing copies of a message that carry no client id
pub const LEGACY_DUPLICATE_WINDOW_SECS: i64 = 5;

/// Locally composed message not yet confirmed by the server
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub client_message_id: String,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub failed: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationTimeline {
    conversation_id: Uuid,
    // Sorted by (created_at, id)
    messages: Vec<MessageView>,
    pending: Vec<PendingMessage>,
}

impl ConversationTimeline {
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Confirmed messages, oldest first
    pub fn messages(&self) -> &[MessageView] {
        &self.messages
    }

    /// Optimistic messages, in the order they were composed
    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&MessageView> {
        self.messages.last()
    }

    /// Record an optimistic send and return the client message id to send
    /// it with.
    pub fn add_pending(&mut self, sender_id: Uuid, content: impl Into<String>) -> String {
        let client_message_id = Uuid::new_v4().to_string();
        self.pending.push(PendingMessage {
            client_message_id: client_message_id.clone(),
            sender_id,
            content: content.into(),
            created_at: Utc::now(),
            failed: false,
        });
        client_message_id
    }

    pub fn mark_failed(&mut self, client_message_id: &str) -> bool {
        match self
            .pending
            .iter_mut()
            .find(|p| p.client_message_id == client_message_id)
        {
            Some(pending) => {
                pending.failed = true;
                true
            }
            None => false,
        }
    }

    /// Clear the failed flag before resending with the same id
    pub fn retry(&mut self, client_message_id: &str) -> Option<&PendingMessage> {
        let pending = self
            .pending
            .iter_mut()
            .find(|p| p.client_message_id == client_message_id)?;
        pending.failed = false;
        Some(pending)
    }

    /// Merge a history page. Returns how many messages were new.
    pub fn merge_history(&mut self, page: impl IntoIterator<Item = MessageView>) -> usize {
        let mut added = 0;
        for message in page {
            if self.apply(message) {
                added += 1;
            }
        }
        added
    }

    /// Apply one server copy of a message. Returns `true` when it was not
    /// already shown.
    pub fn apply(&mut self, message: MessageView) -> bool {
        if message.conversation_id != self.conversation_id {
            return false;
        }

        self.settle_pending(&message);

        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            // Later copies carry newer read state
            *existing = message;
            return false;
        }

        if message.client_message_id.is_none() && self.has_legacy_copy(&message) {
            return false;
        }

        let position = self
            .messages
            .binary_search_by(|m| (m.created_at, m.id).cmp(&(message.created_at, message.id)))
            .unwrap_or_else(|pos| pos);
        self.messages.insert(position, message);
        true
    }

    fn settle_pending(&mut self, message: &MessageView) {
        let index = match &message.client_message_id {
            Some(client_id) => self
                .pending
                .iter()
                .position(|p| &p.client_message_id == client_id),
            None => self.pending.iter().position(|p| {
                p.sender_id == message.sender.id
                    && p.content == message.content
                    && within_window(p.created_at, message.created_at)
            }),
        };
        if let Some(index) = index {
            self.pending.remove(index);
        }
    }

    fn has_legacy_copy(&self, message: &MessageView) -> bool {
        self.messages.iter().any(|m| {
            m.client_message_id.is_none()
                && m.sender.id == message.sender.id
                && m.content == message.content
                && within_window(m.created_at, message.created_at)
        })
    }
}

fn within_window(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).num_milliseconds().abs() <= LEGACY_DUPLICATE_WINDOW_SECS * 1000
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntry {
    pub conversation_id: Uuid,
    /// `None` for conversations first seen through a push; fetch it with
    /// `GET /conversations/{id}`.
    pub conversation: Option<ConversationView>,
    pub last_message: Option<MessageView>,
    pub last_message_at: DateTime<Utc>,
    pub unread: i64,
}

/// Conversation list ordered by most recent activity
#[derive(Debug, Clone)]
pub struct Inbox {
    user_id: Uuid,
    entries: HashMap<Uuid, InboxEntry>,
    open: Option<Uuid>,
}

impl Inbox {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            entries: HashMap::new(),
            open: None,
        }
    }

    /// Replace the list with a fresh page from `GET /conversations`
    pub fn load(&mut self, conversations: impl IntoIterator<Item = ConversationView>) {
        self.entries.clear();
        for view in conversations {
            self.upsert(view);
        }
    }

    pub fn upsert(&mut self, view: ConversationView) {
        let unread = if self.open == Some(view.id) {
            0
        } else {
            view.unread_count
        };
        self.entries.insert(
            view.id,
            InboxEntry {
                conversation_id: view.id,
                last_message: view.last_message.clone(),
                last_message_at: view.last_message_at,
                unread,
                conversation: Some(view),
            },
        );
    }

    /// Fold a pushed message into the list
    pub fn apply_message(&mut self, message: &MessageView) {
        let counts_as_unread =
            message.sender.id != self.user_id && self.open != Some(message.conversation_id);

        let entry = self
            .entries
            .entry(message.conversation_id)
            .or_insert_with(|| InboxEntry {
                conversation_id: message.conversation_id,
                conversation: None,
                last_message: None,
                last_message_at: message.created_at,
                unread: 0,
            });

        if entry.last_message.as_ref().map(|m| m.id) == Some(message.id) {
            return;
        }
        if counts_as_unread && !message.is_read {
            entry.unread += 1;
        }
        if message.created_at >= entry.last_message_at || entry.last_message.is_none() {
            entry.last_message_at = message.created_at;
            entry.last_message = Some(message.clone());
        }
    }

    /// Viewing a conversation clears its badge; the server marks the
    /// messages read when the page is fetched.
    pub fn open(&mut self, conversation_id: Uuid) {
        self.open = Some(conversation_id);
        if let Some(entry) = self.entries.get_mut(&conversation_id) {
            entry.unread = 0;
        }
    }

    pub fn close_view(&mut self) {
        self.open = None;
    }

    pub fn open_conversation(&self) -> Option<Uuid> {
        self.open
    }

    pub fn remove(&mut self, conversation_id: Uuid) -> Option<InboxEntry> {
        if self.open == Some(conversation_id) {
            self.open = None;
        }
        self.entries.remove(&conversation_id)
    }

    pub fn get(&self, conversation_id: Uuid) -> Option<&InboxEntry> {
        self.entries.get(&conversation_id)
    }

    /// Most recent activity first
    pub fn ordered(&self) -> Vec<&InboxEntry> {
        let mut entries: Vec<&InboxEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| b.conversation_id.cmp(&a.conversation_id))
        });
        entries
    }

    pub fn total_unread(&self) -> i64 {
        self.entries.values().map(|e| e.unread).sum()
    }

    /// Entries known only from pushes
    pub fn needs_refresh(&self) -> Vec<Uuid> {
        self.entries
            .values()
            .filter(|e| e.conversation.is_none())
            .map(|e| e.conversation_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a chat screen renders, driven by [`ClientEvent`]s
#[derive(Debug, Clone)]
pub struct ChatState {
    user_id: Uuid,
    pub inbox: Inbox,
    pub typing: TypingIndicators,
    pub status: ConnectionStatus,
    timelines: HashMap<Uuid, ConversationTimeline>,
    last_error: Option<String>,
}

impl ChatState {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            inbox: Inbox::new(user_id),
            typing: TypingIndicators::default(),
            status: ConnectionStatus::Connecting,
            timelines: HashMap::new(),
            last_error: None,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn timeline(&self, conversation_id: Uuid) -> Option<&ConversationTimeline> {
        self.timelines.get(&conversation_id)
    }

    pub fn timeline_mut(&mut self, conversation_id: Uuid) -> &mut ConversationTimeline {
        self.timelines
            .entry(conversation_id)
            .or_insert_with(|| ConversationTimeline::new(conversation_id))
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Merge a page from `GET /conversations/{id}/messages`
    pub fn load_history(&mut self, conversation_id: Uuid, page: Vec<MessageView>) -> usize {
        self.timeline_mut(conversation_id).merge_history(page)
    }

    /// Optimistically add an outgoing message; returns its client id
    pub fn compose(&mut self, conversation_id: Uuid, content: impl Into<String>) -> String {
        let user_id = self.user_id;
        self.timeline_mut(conversation_id).add_pending(user_id, content)
    }

    pub fn apply_client_event(&mut self, event: &ClientEvent, now: Instant) {
        match event {
            ClientEvent::Status(status) => self.status = *status,
            ClientEvent::Server(server_event) => self.apply_server_event(server_event, now),
            ClientEvent::SentViaHttp(message) => self.apply_message(message),
            ClientEvent::SendFailed {
                conversation_id,
                client_message_id,
                error,
            } => {
                self.timeline_mut(*conversation_id)
                    .mark_failed(client_message_id);
                self.last_error = Some(error.clone());
            }
        }
    }

    pub fn apply_server_event(&mut self, event: &WsOutboundEvent, now: Instant) {
        match event {
            WsOutboundEvent::Message { message } => {
                self.apply_message(message);
            }
            WsOutboundEvent::ConversationUpdate { last_message, .. } => {
                self.apply_message(last_message);
            }
            WsOutboundEvent::UserTyping {
                conversation_id,
                user_id,
                user_name,
                is_typing,
            } => {
                if *user_id != self.user_id {
                    self.typing
                        .apply(*conversation_id, *user_id, user_name, *is_typing, now);
                }
            }
            WsOutboundEvent::Error { message, .. } => {
                self.last_error = Some(message.clone());
            }
        }
    }

    fn apply_message(&mut self, message: &MessageView) {
        self.typing
            .clear_user(message.conversation_id, message.sender.id);
        self.inbox.apply_message(message);
        // Only timelines the user has opened are kept in memory
        if let Some(timeline) = self.timelines.get_mut(&message.conversation_id) {
            timeline.apply(message.clone());
        }
    }
}
