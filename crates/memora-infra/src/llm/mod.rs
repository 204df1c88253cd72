//! Model endpoint client implementations.

pub mod openai;
pub mod streaming;
pub mod types;

pub use openai::OpenAiChatModel;
