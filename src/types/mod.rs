mod chat;

pub use chat::{ChatMessage, Role, ToolCall, ToolCallFunction, ToolDefinition, ToolFunction};
