//! Consumer side of the chat protocol.
//!
//! Transport ([`connection::ChatClient`]) and view state ([`state`],
//! [`typing`]) are kept apart so UI code can drive the state types from any
//! event source, including tests.

pub mod connection;
pub mod reconnect;
pub mod state;
pub mod typing;

pub use connection::{ChatClient, ChatClientConfig, ClientCommand, ClientEvent};
pub use reconnect::{ConnectionStatus, ReconnectPolicy};
pub use state::{ChatState, ConversationTimeline, Inbox, InboxEntry, PendingMessage};
pub use typing::TypingIndicators;
