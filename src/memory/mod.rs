//! Conversation memory
//!
//! Persists the message log of each assistant session so follow-up questions
//! can be answered in context.

pub mod postgres;
pub mod store;

pub use postgres::PgConversationStore;
pub use store::{ConversationMessage, ConversationStore, InMemoryConversationStore, MessageBody, MessageRole};
