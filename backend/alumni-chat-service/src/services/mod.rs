pub mod conversation_service;
pub mod identity_client;
pub mod job_client;

pub use conversation_service::{AppendOutcome, ConversationService, MessagePage};
pub use identity_client::{HttpUserDirectory, InMemoryUserDirectory, UserDirectory};
pub use job_client::{HttpJobDirectory, InMemoryJobDirectory, JobDirectory};
