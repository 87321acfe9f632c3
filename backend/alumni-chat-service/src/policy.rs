//! Authorization rules shared by the HTTP and realtime paths.
//!
//! Every function here is pure: it looks only at the acting user's role and
//! the persisted conversation state, so both delivery paths reach identical
//! decisions. The `ensure_*` wrappers turn a denial into `AppError::Forbidden`.

use crate::error::AppError;
use crate::models::{Conversation, Role};
use uuid::Uuid;

/// Only alumni and admins may open new conversations.
pub fn can_initiate(role: Role) -> bool {
    match role {
        Role::Alumni | Role::Admin => true,
        Role::Student | Role::Pending => false,
    }
}

/// Participants may send into active conversations, except that a student
/// may not send into a conversation they initiated.
pub fn can_send(role: Role, conversation: &Conversation, sender_id: Uuid) -> bool {
    if !conversation.is_active() {
        return false;
    }
    match role {
        Role::Student => conversation.initiated_by != sender_id,
        Role::Alumni | Role::Admin | Role::Pending => true,
    }
}

pub fn can_close(role: Role, conversation: &Conversation, user_id: Uuid) -> bool {
    match role {
        Role::Admin | Role::Alumni => true,
        Role::Student | Role::Pending => conversation.initiated_by == user_id,
    }
}

/// Membership alone grants read access, whatever the status.
pub fn can_view_conversation(conversation: &Conversation, user_id: Uuid) -> bool {
    conversation.is_participant(user_id)
}

pub fn ensure_can_initiate(role: Role) -> Result<(), AppError> {
    if can_initiate(role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' cannot start conversations",
            role
        )))
    }
}

pub fn ensure_can_view(conversation: &Conversation, user_id: Uuid) -> Result<(), AppError> {
    if can_view_conversation(conversation, user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "not a participant of this conversation".into(),
        ))
    }
}

pub fn ensure_can_send(
    role: Role,
    conversation: &Conversation,
    sender_id: Uuid,
) -> Result<(), AppError> {
    ensure_can_view(conversation, sender_id)?;
    if can_send(role, conversation, sender_id) {
        return Ok(());
    }
    if !conversation.is_active() {
        Err(AppError::Forbidden("conversation is closed".into()))
    } else {
        Err(AppError::Forbidden(
            "students cannot send into a conversation they started".into(),
        ))
    }
}

/// Admins and alumni may close any conversation. Students and pending users
/// only close one they initiated, which implies membership.
pub fn ensure_can_close(
    role: Role,
    conversation: &Conversation,
    user_id: Uuid,
) -> Result<(), AppError> {
    if can_close(role, conversation, user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "only the initiator, alumni or admins can close this conversation".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationStatus, Participants};

    fn conversation(initiator: Uuid, other: Uuid) -> Conversation {
        Conversation::new(
            Participants::new([initiator, other]).unwrap(),
            initiator,
            None,
            None,
        )
    }

    #[test]
    fn test_can_initiate() {
        assert!(can_initiate(Role::Alumni));
        assert!(can_initiate(Role::Admin));
        assert!(!can_initiate(Role::Student));
        assert!(!can_initiate(Role::Pending));
    }

    #[test]
    fn test_student_cannot_send_into_own_thread() {
        let student = Uuid::new_v4();
        let alumni = Uuid::new_v4();
        let conv = conversation(student, alumni);

        assert!(!can_send(Role::Student, &conv, student));
        assert!(can_send(Role::Alumni, &conv, alumni));
    }

    #[test]
    fn test_student_can_reply() {
        let alumni = Uuid::new_v4();
        let student = Uuid::new_v4();
        let conv = conversation(alumni, student);
        assert!(can_send(Role::Student, &conv, student));
        assert!(ensure_can_send(Role::Student, &conv, student).is_ok());
    }

    #[test]
    fn test_closed_conversation_rejects_every_role() {
        let alumni = Uuid::new_v4();
        let student = Uuid::new_v4();
        let mut conv = conversation(alumni, student);
        conv.status = ConversationStatus::Closed;

        for role in [Role::Student, Role::Alumni, Role::Admin, Role::Pending] {
            assert!(!can_send(role, &conv, alumni));
            assert!(!can_send(role, &conv, student));
        }
        assert_eq!(
            ensure_can_send(Role::Alumni, &conv, alumni),
            Err(AppError::Forbidden("conversation is closed".into()))
        );
    }

    #[test]
    fn test_non_participant_cannot_send() {
        let conv = conversation(Uuid::new_v4(), Uuid::new_v4());
        let outsider = Uuid::new_v4();
        assert!(matches!(
            ensure_can_send(Role::Admin, &conv, outsider),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_can_close() {
        let student = Uuid::new_v4();
        let alumni = Uuid::new_v4();
        let by_alumni = conversation(alumni, student);
        let by_student = conversation(student, alumni);

        assert!(can_close(Role::Alumni, &by_alumni, alumni));
        assert!(can_close(Role::Admin, &by_alumni, Uuid::new_v4()));
        assert!(!can_close(Role::Student, &by_alumni, student));
        assert!(can_close(Role::Student, &by_student, student));
    }

    #[test]
    fn test_close_without_membership() {
        let conv = conversation(Uuid::new_v4(), Uuid::new_v4());
        assert!(ensure_can_close(Role::Admin, &conv, Uuid::new_v4()).is_ok());
        assert!(ensure_can_close(Role::Alumni, &conv, Uuid::new_v4()).is_ok());
        assert!(matches!(
            ensure_can_close(Role::Student, &conv, Uuid::new_v4()),
            Err(AppError::Forbidden(_))
        ));
        assert!(ensure_can_close(Role::Pending, &conv, Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_view_ignores_status() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut conv = conversation(a, b);
        conv.status = ConversationStatus::Closed;
        assert!(can_view_conversation(&conv, b));
        assert!(!can_view_conversation(&conv, Uuid::new_v4()));
    }
}
