//! Role-tagged chat completion over OpenAI, Anthropic or Ollama.

pub mod http;
pub mod json;
pub mod provider;

pub use http::{create_provider, ChatBackend, HttpChatProvider};
pub use json::{complete_json, extract_json};
pub use provider::{LlmError, LlmProvider, Message, Role};
