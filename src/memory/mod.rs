//! 记忆层：对话消息与短期历史（长期记忆、持久化由外部协作方负责）

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
