//! Persistence layer
//!
//! SQLite-based storage for:
//! - Conversations and their generation flag
//! - Per-conversation settings (prompt template, enabled tools)
//! - Messages in creation order
//! - Application settings as key-value JSON

mod conversations;
mod database;
mod key_values;
mod messages;

pub use conversations::{Conversation, ConversationSettings, ConversationStore};
pub use database::Database;
pub use key_values::KeyValueStore;
pub use messages::{Message, MessageStore, AUTHOR_ASSISTANT, AUTHOR_USER};
