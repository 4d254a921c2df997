//! Chat session with the embedded accounting assistant.

pub mod client;
pub mod session;
pub mod types;

pub use client::{AssistantTransport, HttpAssistantTransport};
pub use session::{ChatSession, SendOutcome};
pub use types::{
    Attachment, ChatMessage, ChatReply, ChatRequest, FileDescriptor, HistoryEntry, MessageKind,
    PageContext, Role,
};
