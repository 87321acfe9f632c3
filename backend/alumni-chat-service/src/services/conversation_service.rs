//! Conversation lifecycle and message append.
//!
//! This is the single entry point both delivery paths write through: HTTP
//! handlers call it directly and the realtime gateway calls it for
//! `sendMessage`. Primary writes fail the operation; presentation enrichment
//! (participant display fields, last message, unread counts) degrades to
//! partial data with a warning.

use crate::error::{AppError, AppResult};
use crate::models::{
    self, Conversation, ConversationView, JobSummary, Message, MessageType, MessageView,
    ParticipantView, Participants, Role, UserProfile,
};
use crate::policy;
use crate::services::identity_client::by_id;
use crate::services::{JobDirectory, UserDirectory};
use crate::store::ChatStore;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_CONVERSATION_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MESSAGE_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// One-based page request, validated and clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub page_size: u32,
}

impl Paging {
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> AppResult<Self> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::InvalidArgument("page starts at 1".into()));
        }
        let page_size = page_size.unwrap_or(default_size);
        if page_size == 0 {
            return Err(AppError::InvalidArgument("pageSize must be positive".into()));
        }
        Ok(Self {
            page,
            page_size: page_size.min(MAX_PAGE_SIZE),
        })
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// Chronological (oldest first) page of a conversation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

/// Result of an append
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// Conversation as of the append, `last_message_at` reflecting the message
    pub conversation: Conversation,
    pub message: MessageView,
    /// `false` when the client message id had already been accepted
    pub created: bool,
}

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ChatStore>,
    users: Arc<dyn UserDirectory>,
    jobs: Arc<dyn JobDirectory>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        users: Arc<dyn UserDirectory>,
        jobs: Arc<dyn JobDirectory>,
    ) -> Self {
        Self { store, users, jobs }
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    /// Start a conversation between the actor and `participant_ids`.
    pub async fn initiate(
        &self,
        actor: &UserProfile,
        participant_ids: Vec<Uuid>,
        job_id: Option<Uuid>,
        application_id: Option<Uuid>,
    ) -> AppResult<ConversationView> {
        policy::ensure_can_initiate(actor.role)?;
        if participant_ids.is_empty() {
            return Err(AppError::InvalidArgument(
                "participantIds must not be empty".into(),
            ));
        }

        let participants =
            Participants::new(participant_ids.into_iter().chain(std::iter::once(actor.id)))?;
        let users = self.resolve_participants(&participants).await?;
        if let Some(job_id) = job_id {
            self.require_job(job_id).await?;
        }
        self.ensure_no_active_thread(&participants).await?;

        let conversation = Conversation::new(participants, actor.id, job_id, application_id);
        self.store.create_conversation(&conversation, None).await?;

        info!(
            conversation_id = %conversation.id,
            initiated_by = %actor.id,
            participants = conversation.participants.len(),
            "conversation created"
        );
        Ok(ConversationView::build(&conversation, &users))
    }

    /// Start a conversation with a shortlisted applicant, seeded with a system
    /// message announcing the shortlisting. Conversation and message are
    /// written in one unit of work.
    pub async fn initiate_from_shortlist(
        &self,
        actor: &UserProfile,
        job_id: Uuid,
        application_id: Uuid,
        applicant_id: Uuid,
    ) -> AppResult<ConversationView> {
        policy::ensure_can_initiate(actor.role)?;
        let job = self.require_job(job_id).await?;
        if actor.role != Role::Admin && job.posted_by != actor.id {
            return Err(AppError::Forbidden(
                "only the job poster or an admin can shortlist for this job".into(),
            ));
        }

        let participants = Participants::new([actor.id, applicant_id])?;
        let users = self.resolve_participants(&participants).await?;
        self.ensure_no_active_thread(&participants).await?;

        let mut conversation =
            Conversation::new(participants, actor.id, Some(job_id), Some(application_id));
        let seed = Message::new(
            conversation.id,
            actor.id,
            shortlist_announcement(actor, &job),
            MessageType::System,
            None,
        );
        conversation.last_message_at = seed.created_at;

        self.store
            .create_conversation(&conversation, Some(&seed))
            .await?;

        info!(
            conversation_id = %conversation.id,
            job_id = %job_id,
            applicant_id = %applicant_id,
            "shortlist conversation created"
        );
        Ok(ConversationView::build(&conversation, &users)
            .with_last_message(Some(MessageView::build(&seed, &users))))
    }

    /// Persist a message from `actor`. `last_message_at` is advanced after the
    /// insert; if that second write fails the message still counts as sent.
    /// System messages are only synthesized here, never accepted from callers.
    pub async fn append_message(
        &self,
        actor: &UserProfile,
        conversation_id: Uuid,
        content: &str,
        message_type: MessageType,
        client_message_id: Option<String>,
    ) -> AppResult<AppendOutcome> {
        let mut conversation = self.require_conversation(conversation_id).await?;
        policy::ensure_can_send(actor.role, &conversation, actor.id).map_err(|e| {
            debug!(user_id = %actor.id, conversation_id = %conversation_id, error = %e, "send rejected");
            e
        })?;
        if message_type == MessageType::System {
            return Err(AppError::InvalidArgument(
                "system messages cannot be sent by clients".into(),
            ));
        }
        let content = Message::validate_content(content)?;
        let client_message_id = Message::validate_client_message_id(client_message_id)?;

        let message = Message::new(
            conversation_id,
            actor.id,
            content,
            message_type,
            client_message_id,
        );
        let (stored, created) = self.store.insert_message(&message).await?;

        if created {
            match self
                .store
                .touch_last_message_at(conversation_id, stored.created_at)
                .await
            {
                Ok(()) => {
                    if stored.created_at > conversation.last_message_at {
                        conversation.last_message_at = stored.created_at;
                    }
                }
                Err(e) => warn!(
                    conversation_id = %conversation_id,
                    message_id = %stored.id,
                    error = %e,
                    "failed to advance last_message_at; message kept"
                ),
            }
        } else {
            debug!(
                conversation_id = %conversation_id,
                message_id = %stored.id,
                "duplicate client message id, returning stored message"
            );
        }

        Ok(AppendOutcome {
            conversation,
            message: MessageView::with_sender(&stored, ParticipantView::from(actor)),
            created,
        })
    }

    /// Chronological page for a participant. Opening the page marks every
    /// message the reader did not send as read.
    pub async fn list_messages(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        paging: Paging,
    ) -> AppResult<MessagePage> {
        let conversation = self.require_conversation(conversation_id).await?;
        policy::ensure_can_view(&conversation, actor_id)?;

        match self
            .store
            .mark_read(conversation_id, actor_id, models::now())
            .await
        {
            Ok(0) => {}
            Ok(marked) => debug!(conversation_id = %conversation_id, reader = %actor_id, marked, "messages marked read"),
            Err(e) => warn!(conversation_id = %conversation_id, error = %e, "failed to mark messages read"),
        }

        let mut messages = self
            .store
            .list_messages(conversation_id, paging.limit() + 1, paging.offset())
            .await?;
        let has_more = messages.len() as i64 > paging.limit();
        messages.truncate(paging.page_size as usize);
        messages.reverse();

        let users = self
            .lookup_users(conversation.participants.ids())
            .await;
        Ok(MessagePage {
            messages: messages
                .iter()
                .map(|m| view_for(m, actor_id, &users))
                .collect(),
            page: paging.page,
            page_size: paging.page_size,
            has_more,
        })
    }

    /// Close a conversation. Closing an already-closed conversation succeeds
    /// without changes.
    pub async fn close_conversation(
        &self,
        actor: &UserProfile,
        conversation_id: Uuid,
    ) -> AppResult<ConversationView> {
        let mut conversation = self.require_conversation(conversation_id).await?;
        policy::ensure_can_close(actor.role, &conversation, actor.id)?;

        if conversation.is_active() {
            if self.store.close_conversation(conversation_id).await? {
                info!(conversation_id = %conversation_id, closed_by = %actor.id, "conversation closed");
            }
            conversation.status = models::ConversationStatus::Closed;
        }

        let users = self.lookup_users(conversation.participants.ids()).await;
        Ok(ConversationView::build(&conversation, &users))
    }

    /// A single conversation, for one of its participants.
    pub async fn get_conversation(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<ConversationView> {
        let conversation = self.conversation_for_member(actor_id, conversation_id).await?;
        let users = self.lookup_users(conversation.participants.ids()).await;
        Ok(self.decorate(&conversation, actor_id, &users).await)
    }

    /// Active conversations of `user_id`, most recent activity first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        paging: Paging,
    ) -> AppResult<Vec<ConversationView>> {
        let conversations = self
            .store
            .list_active_for_user(user_id, paging.limit(), paging.offset())
            .await?;

        let ids: Vec<Uuid> = conversations
            .iter()
            .flat_map(|c| c.participants.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let users = self.lookup_users(&ids).await;

        let mut views = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            views.push(self.decorate(conversation, user_id, &users).await);
        }
        Ok(views)
    }

    /// Users the actor may start a conversation with
    pub async fn eligible_users(
        &self,
        actor: &UserProfile,
        query: &str,
        limit: usize,
    ) -> AppResult<Vec<ParticipantView>> {
        policy::ensure_can_initiate(actor.role)?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE as usize);
        let found = self.users.search_users(query, limit + 1).await?;
        Ok(found
            .iter()
            .filter(|u| u.id != actor.id && u.role != Role::Pending)
            .take(limit)
            .map(ParticipantView::from)
            .collect())
    }

    /// Load a conversation and confirm `user_id` participates in it.
    ///
    /// The realtime gateway calls this on every join and typing event so that
    /// room membership is always checked against persisted state.
    pub async fn conversation_for_member(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = self.require_conversation(conversation_id).await?;
        policy::ensure_can_view(&conversation, user_id)?;
        Ok(conversation)
    }

    async fn require_conversation(&self, id: Uuid) -> AppResult<Conversation> {
        self.store
            .find_conversation(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))
    }

    async fn require_job(&self, job_id: Uuid) -> AppResult<JobSummary> {
        self.jobs
            .find_job_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))
    }

    /// Every participant must exist in the identity service
    async fn resolve_participants(
        &self,
        participants: &Participants,
    ) -> AppResult<HashMap<Uuid, UserProfile>> {
        let users = by_id(self.users.find_users_by_ids(participants.ids()).await?);
        if let Some(missing) = participants.iter().find(|id| !users.contains_key(*id)) {
            return Err(AppError::NotFound(format!("user {missing}")));
        }
        Ok(users)
    }

    async fn ensure_no_active_thread(&self, participants: &Participants) -> AppResult<()> {
        match self.store.find_active_by_participants(participants).await? {
            Some(existing) => Err(AppError::Conflict {
                conversation_id: existing.id,
            }),
            None => Ok(()),
        }
    }

    /// Best-effort display data; an identity outage leaves bare ids
    async fn lookup_users(&self, ids: &[Uuid]) -> HashMap<Uuid, UserProfile> {
        match self.users.find_users_by_ids(ids).await {
            Ok(users) => by_id(users),
            Err(e) => {
                warn!(error = %e, count = ids.len(), "participant enrichment failed");
                HashMap::new()
            }
        }
    }

    async fn decorate(
        &self,
        conversation: &Conversation,
        viewer_id: Uuid,
        users: &HashMap<Uuid, UserProfile>,
    ) -> ConversationView {
        let last_message = match self.store.latest_message(conversation.id).await {
            Ok(message) => message.map(|m| view_for(&m, viewer_id, users)),
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "last message lookup failed");
                None
            }
        };
        let unread = match self.store.count_unread(conversation.id, viewer_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "unread count failed");
                0
            }
        };
        ConversationView::build(conversation, users)
            .with_last_message(last_message)
            .with_unread_count(unread)
    }
}

/// Client message ids are shown to their sender only
fn view_for(message: &Message, viewer_id: Uuid, users: &HashMap<Uuid, UserProfile>) -> MessageView {
    let view = MessageView::build(message, users);
    if message.sender_id == viewer_id {
        view
    } else {
        view.without_client_id()
    }
}

fn shortlist_announcement(actor: &UserProfile, job: &JobSummary) -> String {
    format!(
        "{} shortlisted your application for {} at {}. Reply here to continue the conversation.",
        actor.name, job.role, job.company
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_defaults_and_clamp() {
        let paging = Paging::new(None, None, DEFAULT_MESSAGE_PAGE_SIZE).unwrap();
        assert_eq!(paging.page, 1);
        assert_eq!(paging.page_size, 50);
        assert_eq!(paging.offset(), 0);

        let paging = Paging::new(Some(3), Some(500), DEFAULT_CONVERSATION_PAGE_SIZE).unwrap();
        assert_eq!(paging.page_size, MAX_PAGE_SIZE);
        assert_eq!(paging.offset(), 200);
    }

    #[test]
    fn test_paging_rejects_zero() {
        assert!(Paging::new(Some(0), None, 20).is_err());
        assert!(Paging::new(Some(1), Some(0), 20).is_err());
    }

    #[test]
    fn test_shortlist_announcement_mentions_role_and_company() {
        let actor = UserProfile {
            id: Uuid::new_v4(),
            name: "Ana Lima".into(),
            email: "ana@example.edu".into(),
            avatar: None,
            role: Role::Alumni,
        };
        let job = JobSummary {
            id: Uuid::new_v4(),
            role: "Backend Engineer".into(),
            company: "Acme".into(),
            posted_by: actor.id,
        };
        let text = shortlist_announcement(&actor, &job);
        assert!(text.contains("Backend Engineer"));
        assert!(text.contains("Acme"));
        assert!(text.starts_with("Ana Lima"));
    }
}
