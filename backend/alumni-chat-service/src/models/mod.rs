pub mod conversation;
pub mod message;
pub mod role;
pub mod user;
pub mod view;

pub use conversation::{Conversation, ConversationStatus, Participants};
pub use message::{Message, MessageType, MAX_CONTENT_CHARS};
pub use role::Role;
pub use user::{JobSummary, UserProfile};
pub use view::{ConversationView, MessageView, ParticipantView};

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at the precision Postgres stores (microseconds), so values
/// read back from the database compare equal to the ones that were written.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
