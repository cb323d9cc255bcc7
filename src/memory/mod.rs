//! 记忆层：对话模型与 SQLite 持久化

pub mod conversation;
pub mod store;

pub use conversation::{ContentBlock, Conversation, Message, Role, ToolCallRequest};
pub use store::ConversationStore;
