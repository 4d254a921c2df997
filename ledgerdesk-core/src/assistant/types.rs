use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// What a log entry represents beyond its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Normal,
    /// Appended when the user cancels a pending request.
    CancelNotice,
    Error { retryable: bool },
}

/// One entry in the chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// The assistant flagged its answer as low confidence
    #[serde(default)]
    pub uncertain: bool,
    /// Name of the tool the assistant ran to answer, if any
    #[serde(default)]
    pub tool_used: Option<String>,
    pub kind: MessageKind,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            uncertain: false,
            tool_used: None,
            kind,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, MessageKind::Normal)
    }

    pub fn reply(reply: ChatReply) -> Self {
        Self {
            uncertain: reply.uncertain,
            tool_used: reply.tool_used,
            ..Self::new(Role::Assistant, reply.response, MessageKind::Normal)
        }
    }

    pub fn cancel_notice() -> Self {
        Self::new(Role::Assistant, "Request cancelled.", MessageKind::CancelNotice)
    }

    pub fn error(content: impl Into<String>, retryable: bool) -> Self {
        Self::new(Role::Assistant, content, MessageKind::Error { retryable })
    }

    /// Only real conversation turns are replayed to the assistant.
    pub fn is_conversation(&self) -> bool {
        self.kind == MessageKind::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl From<&ChatMessage> for HistoryEntry {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Uploaded file as returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Where in the app the user is while chatting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<FileDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_context: Option<PageContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub uncertain: bool,
    #[serde(default)]
    pub tool_used: Option<String>,
}

/// Structured error body of the chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatErrorBody {
    pub error: String,
    #[serde(default)]
    pub retryable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format_is_camel_case() {
        let request = ChatRequest {
            user_id: "u-1".to_string(),
            message: "What is overdue?".to_string(),
            history: vec![],
            attachments: vec![],
            page_context: Some(PageContext {
                path: "/invoices".to_string(),
                entity_type: Some("invoice".to_string()),
                entity_id: None,
            }),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "userId": "u-1",
                "message": "What is overdue?",
                "history": [],
                "pageContext": { "path": "/invoices", "entityType": "invoice" }
            })
        );
    }

    #[test]
    fn test_reply_markers_default_off() {
        let reply: ChatReply = serde_json::from_value(json!({ "response": "Done." })).unwrap();
        assert!(!reply.uncertain);
        assert_eq!(reply.tool_used, None);

        let reply: ChatReply = serde_json::from_value(json!({
            "response": "Probably $120.",
            "uncertain": true,
            "toolUsed": "query_ledger"
        }))
        .unwrap();
        let message = ChatMessage::reply(reply);
        assert!(message.uncertain);
        assert_eq!(message.tool_used.as_deref(), Some("query_ledger"));
    }
}
