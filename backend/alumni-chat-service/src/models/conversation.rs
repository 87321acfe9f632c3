use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Closed,
}

impl ConversationStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

/// Conversation membership: sorted, duplicate free, at least two users.
///
/// The only way to obtain a value is through [`Participants::new`], so every
/// persisted conversation carries a valid set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Participants(Vec<Uuid>);

impl Participants {
    pub const MIN: usize = 2;

    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Result<Self, AppError> {
        let mut ids: Vec<Uuid> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() < Self::MIN {
            return Err(AppError::InvalidArgument(format!(
                "a conversation needs at least {} distinct participants",
                Self::MIN
            )));
        }
        Ok(Self(ids))
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.0.binary_search(&user_id).is_ok()
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical string form of the set, used to look up the active thread
    /// for an exact participant set.
    pub fn key(&self) -> String {
        self.0
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<'de> Deserialize<'de> for Participants {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let ids = Vec::<Uuid>::deserialize(deserializer)?;
        Participants::new(ids).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: Participants,
    pub initiated_by: Uuid,
    pub job_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub status: ConversationStatus,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh active conversation
    pub fn new(
        participants: Participants,
        initiated_by: Uuid,
        job_id: Option<Uuid>,
        application_id: Option<Uuid>,
    ) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            participants,
            initiated_by,
            job_id,
            application_id,
            status: ConversationStatus::Active,
            last_message_at: now,
            created_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participants_are_sorted_and_deduplicated() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let set = Participants::new([b, a, b, a]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.ids().windows(2).all(|w| w[0] < w[1]));
        assert!(set.contains(a) && set.contains(b));
    }

    #[test]
    fn test_participants_need_two_distinct_users() {
        let a = Uuid::new_v4();
        assert!(matches!(
            Participants::new([a, a]),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(Participants::new([]).is_err());
    }

    #[test]
    fn test_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let first = Participants::new([a, b, c]).unwrap();
        let second = Participants::new([c, a, b]).unwrap();
        assert_eq!(first.key(), second.key());
    }

    #[test]
    fn test_deserialize_rejects_single_participant() {
        let json = format!("[\"{}\"]", Uuid::new_v4());
        assert!(serde_json::from_str::<Participants>(&json).is_err());
    }

    #[test]
    fn test_status_from_db() {
        assert_eq!(
            ConversationStatus::from_db("active"),
            Some(ConversationStatus::Active)
        );
        assert_eq!(
            ConversationStatus::from_db("closed"),
            Some(ConversationStatus::Closed)
        );
        assert_eq!(ConversationStatus::from_db("archived"), None);
    }
}
