use super::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User record returned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default = "pending_role", deserialize_with = "lenient_role")]
    pub role: Role,
}

fn pending_role() -> Role {
    Role::Pending
}

fn lenient_role<'de, D>(deserializer: D) -> Result<Role, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(Role::from_db(&raw))
}

/// Job posting fields needed by the chat core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: Uuid,
    /// Position title
    pub role: String,
    pub company: String,
    pub posted_by: Uuid,
}
