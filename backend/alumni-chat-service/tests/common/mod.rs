//! Shared fixtures: an in-memory deployment with a small directory of users
//! and one posted job.

#![allow(dead_code)]

use alumni_chat_service::config::Config;
use alumni_chat_service::middleware::auth::Claims;
use alumni_chat_service::models::{JobSummary, Role, UserProfile};
use alumni_chat_service::services::{
    ConversationService, InMemoryJobDirectory, InMemoryUserDirectory,
};
use alumni_chat_service::state::AppState;
use alumni_chat_service::store::MemoryChatStore;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret-for-alumni-chat";

pub struct Fixture {
    pub alumni: UserProfile,
    pub other_alumni: UserProfile,
    pub student: UserProfile,
    pub other_student: UserProfile,
    pub admin: UserProfile,
    pub pending: UserProfile,
    pub job: JobSummary,
    pub store: Arc<MemoryChatStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub jobs: Arc<InMemoryJobDirectory>,
}

pub fn user(name: &str, role: Role) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@alumni.example.edu", name.to_lowercase().replace(' ', ".")),
        avatar: None,
        role,
    }
}

impl Fixture {
    pub fn new() -> Self {
        let alumni = user("Ana Alumni", Role::Alumni);
        let other_alumni = user("Bruno Alumni", Role::Alumni);
        let student = user("Carla Student", Role::Student);
        let other_student = user("Diego Student", Role::Student);
        let admin = user("Eva Admin", Role::Admin);
        let pending = user("Fabio Pending", Role::Pending);
        let job = JobSummary {
            id: Uuid::new_v4(),
            role: "Backend Engineer".into(),
            company: "Acme".into(),
            posted_by: alumni.id,
        };

        let users = Arc::new(InMemoryUserDirectory::with_users([
            alumni.clone(),
            other_alumni.clone(),
            student.clone(),
            other_student.clone(),
            admin.clone(),
            pending.clone(),
        ]));
        let jobs = Arc::new(InMemoryJobDirectory::with_jobs([job.clone()]));

        Self {
            alumni,
            other_alumni,
            student,
            other_student,
            admin,
            pending,
            job,
            store: Arc::new(MemoryChatStore::new()),
            users,
            jobs,
        }
    }

    pub fn service(&self) -> ConversationService {
        ConversationService::new(self.store.clone(), self.users.clone(), self.jobs.clone())
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::new(Config::test_defaults()),
            self.store.clone(),
            self.users.clone(),
            self.jobs.clone(),
        )
        .expect("test state")
    }
}

pub fn token_for(user_id: Uuid) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("encode token")
}

pub fn expired_token_for(user_id: Uuid) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now - 7200,
        exp: now - 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("encode token")
}
