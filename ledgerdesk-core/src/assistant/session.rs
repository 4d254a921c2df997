use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::AssistantTransport;
use super::types::{Attachment, ChatMessage, ChatRequest, FileDescriptor, HistoryEntry, PageContext};
use crate::error::AssistantError;

/// Result of sending (or re-sending) a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Replied,
    /// The user cancelled; a notice was appended instead of an error.
    Cancelled,
    Failed(AssistantError),
    /// Nothing to send.
    Skipped,
}

/// Assistant chat state for one signed-in user.
///
/// Created when the user's session starts and dropped with it.
pub struct ChatSession {
    user_id: String,
    open: bool,
    messages: Vec<ChatMessage>,
    pending: Vec<FileDescriptor>,
    offered: HashSet<String>,
    history_limit: usize,
    retry_slot: Option<ChatRequest>,
}

impl ChatSession {
    pub fn new(user_id: impl Into<String>, history_limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            open: false,
            messages: Vec::new(),
            pending: Vec::new(),
            offered: HashSet::new(),
            history_limit,
            retry_slot: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn pending_attachments(&self) -> &[FileDescriptor] {
        &self.pending
    }

    pub fn remove_attachment(&mut self, file_id: &str) {
        self.pending.retain(|f| f.file_id != file_id);
    }

    pub fn can_retry(&self) -> bool {
        self.retry_slot.is_some()
    }

    /// True the first time a proactive suggestion comes up this session.
    pub fn should_offer(&mut self, suggestion: &str) -> bool {
        self.offered.insert(suggestion.to_string())
    }

    /// The most recent conversation turns, oldest first.
    fn history(&self) -> Vec<HistoryEntry> {
        let turns: Vec<&ChatMessage> = self.messages.iter().filter(|m| m.is_conversation()).collect();
        let skip = turns.len().saturating_sub(self.history_limit);
        turns[skip..].iter().map(|m| HistoryEntry::from(*m)).collect()
    }

    /// Sends `text` with the pending attachments.
    pub async fn send(
        &mut self,
        transport: &dyn AssistantTransport,
        text: &str,
        page_context: Option<PageContext>,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() && self.pending.is_empty() {
            return SendOutcome::Skipped;
        }

        let request = ChatRequest {
            user_id: self.user_id.clone(),
            message: text.to_string(),
            history: self.history(),
            attachments: std::mem::take(&mut self.pending),
            page_context,
        };
        self.messages.push(ChatMessage::user(text));
        self.retry_slot = None;

        self.dispatch(transport, request, cancel).await
    }

    /// Re-sends the last failed request, if it may be retried.
    pub async fn retry(&mut self, transport: &dyn AssistantTransport, cancel: &CancellationToken) -> SendOutcome {
        let Some(request) = self.retry_slot.take() else {
            return SendOutcome::Skipped;
        };
        info!("Retrying assistant request for {}", self.user_id);
        self.dispatch(transport, request, cancel).await
    }

    /// Uploads a file and queues it for the next message.
    pub async fn upload(
        &mut self,
        transport: &dyn AssistantTransport,
        attachment: Attachment,
    ) -> Result<&FileDescriptor, AssistantError> {
        let name = attachment.file_name.clone();
        let descriptor = transport.upload(attachment).await.map_err(|e| {
            warn!("Upload of {} failed: {}", name, e);
            e
        })?;
        self.pending.push(descriptor);
        Ok(&self.pending[self.pending.len() - 1])
    }

    /// Puts the files of an unsent request back in front of the queue.
    fn restore_attachments(&mut self, request: ChatRequest) {
        let mut attachments = request.attachments;
        attachments.append(&mut self.pending);
        self.pending = attachments;
    }

    async fn dispatch(
        &mut self,
        transport: &dyn AssistantTransport,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = transport.send(&request) => Some(result),
        };

        match result {
            None => {
                debug!("Assistant request cancelled by user");
                self.messages.push(ChatMessage::cancel_notice());
                self.restore_attachments(request);
                SendOutcome::Cancelled
            }
            Some(Ok(reply)) => {
                self.messages.push(ChatMessage::reply(reply));
                SendOutcome::Replied
            }
            Some(Err(e)) => {
                warn!("Assistant request failed: {}", e);
                let retryable = e.is_retryable();
                self.messages.push(ChatMessage::error(error_text(&e), retryable));
                if retryable {
                    self.retry_slot = Some(request);
                } else {
                    self.restore_attachments(request);
                }
                SendOutcome::Failed(e)
            }
        }
    }
}

fn error_text(err: &AssistantError) -> String {
    match err {
        AssistantError::Connection(_) => {
            "I couldn't reach the server. Check your connection and try again.".to_string()
        }
        AssistantError::Server { message, .. } => message.clone(),
        AssistantError::Decode(_) => "I received a response I couldn't read.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::types::{ChatReply, MessageKind, Role};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<ChatReply, AssistantError>>>,
        requests: Mutex<Vec<ChatRequest>>,
        hang: bool,
    }

    impl ScriptedTransport {
        fn with(replies: Vec<Result<ChatReply, AssistantError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AssistantTransport for ScriptedTransport {
        async fn send(&self, request: &ChatRequest) -> Result<ChatReply, AssistantError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AssistantError::Connection("script exhausted".to_string())))
        }

        async fn upload(&self, attachment: Attachment) -> Result<FileDescriptor, AssistantError> {
            Ok(FileDescriptor {
                file_id: format!("f-{}", attachment.file_name),
                file_name: attachment.file_name,
                content_type: Some(attachment.content_type),
                size: Some(attachment.bytes.len() as u64),
            })
        }
    }

    fn ok(text: &str) -> Result<ChatReply, AssistantError> {
        Ok(ChatReply {
            response: text.to_string(),
            uncertain: false,
            tool_used: None,
        })
    }

    #[tokio::test]
    async fn test_reply_is_appended() {
        let transport = ScriptedTransport::with(vec![ok("You have 3 overdue invoices.")]);
        let mut session = ChatSession::new("u-1", 10);

        let outcome = session
            .send(&transport, "What's overdue?", None, &CancellationToken::new())
            .await;

        assert_eq!(outcome, SendOutcome::Replied);
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, Role::Assistant);
        assert_eq!(session.messages()[1].content, "You have 3 overdue invoices.");
    }

    #[tokio::test]
    async fn test_cancel_appends_notice_not_error() {
        let transport = ScriptedTransport {
            hang: true,
            ..ScriptedTransport::default()
        };
        let mut session = ChatSession::new("u-1", 10);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let (outcome, _) = tokio::join!(
            session.send(&transport, "Summarize Q3", None, &cancel),
            async move {
                tokio::task::yield_now().await;
                trigger.cancel();
            }
        );

        assert_eq!(outcome, SendOutcome::Cancelled);
        let last = session.messages().last().unwrap();
        assert_eq!(last.kind, MessageKind::CancelNotice);
        assert!(!session.messages().iter().any(|m| matches!(m.kind, MessageKind::Error { .. })));
        assert!(!session.can_retry());
    }

    #[tokio::test]
    async fn test_connection_failure_offers_retry() {
        let transport = ScriptedTransport::with(vec![
            Err(AssistantError::Connection("refused".to_string())),
            ok("Here you go."),
        ]);
        let mut session = ChatSession::new("u-1", 10);
        let cancel = CancellationToken::new();

        let outcome = session.send(&transport, "Cash balance?", None, &cancel).await;
        assert!(matches!(outcome, SendOutcome::Failed(AssistantError::Connection(_))));
        assert_eq!(
            session.messages().last().unwrap().kind,
            MessageKind::Error { retryable: true }
        );
        assert!(session.can_retry());

        assert_eq!(session.retry(&transport, &cancel).await, SendOutcome::Replied);
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
    }

    #[tokio::test]
    async fn test_server_error_carries_retryable_flag() {
        let transport = ScriptedTransport::with(vec![Err(AssistantError::Server {
            message: "That report is not available.".to_string(),
            retryable: false,
        })]);
        let mut session = ChatSession::new("u-1", 10);

        session
            .send(&transport, "Run report", None, &CancellationToken::new())
            .await;

        let last = session.messages().last().unwrap();
        assert_eq!(last.content, "That report is not available.");
        assert_eq!(last.kind, MessageKind::Error { retryable: false });
        assert!(!session.can_retry());
    }

    #[tokio::test]
    async fn test_history_is_truncated_and_skips_notices() {
        let replies = (0..6).map(|i| ok(&format!("answer {}", i))).collect();
        let transport = ScriptedTransport::with(replies);
        let mut session = ChatSession::new("u-1", 4);
        let cancel = CancellationToken::new();

        for i in 0..3 {
            session.send(&transport, &format!("question {}", i), None, &cancel).await;
        }
        session.messages.push(ChatMessage::cancel_notice());
        session.send(&transport, "question 3", None, &cancel).await;

        let requests = transport.requests.lock().unwrap();
        let history = &requests[3].history;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "question 1");
        assert_eq!(history[3].content, "answer 2");
    }

    #[tokio::test]
    async fn test_attachments_go_out_with_next_message() {
        let transport = ScriptedTransport::with(vec![ok("Got it.")]);
        let mut session = ChatSession::new("u-1", 10);

        let descriptor = session
            .upload(
                &transport,
                Attachment {
                    file_name: "receipt.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                    bytes: vec![1, 2, 3],
                },
            )
            .await
            .unwrap();
        assert_eq!(descriptor.file_id, "f-receipt.pdf");

        session
            .send(&transport, "File this", None, &CancellationToken::new())
            .await;

        assert!(session.pending_attachments().is_empty());
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].attachments.len(), 1);
    }

    fn receipt() -> Attachment {
        Attachment {
            file_name: "receipt.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_cancelled_send_keeps_attachments() {
        let transport = ScriptedTransport {
            hang: true,
            ..ScriptedTransport::default()
        };
        let mut session = ChatSession::new("u-1", 10);
        session.upload(&transport, receipt()).await.unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let (outcome, _) = tokio::join!(
            session.send(&transport, "File this", None, &cancel),
            async move {
                tokio::task::yield_now().await;
                trigger.cancel();
            }
        );

        assert_eq!(outcome, SendOutcome::Cancelled);
        assert_eq!(session.pending_attachments().len(), 1);
        assert_eq!(session.pending_attachments()[0].file_id, "f-receipt.pdf");
    }

    #[tokio::test]
    async fn test_rejected_send_keeps_attachments() {
        let transport = ScriptedTransport::with(vec![Err(AssistantError::Server {
            message: "Unsupported file.".to_string(),
            retryable: false,
        })]);
        let mut session = ChatSession::new("u-1", 10);
        session.upload(&transport, receipt()).await.unwrap();

        session
            .send(&transport, "File this", None, &CancellationToken::new())
            .await;

        assert!(!session.can_retry());
        assert_eq!(session.pending_attachments().len(), 1);
    }

    #[test]
    fn test_suggestions_offered_once() {
        let mut session = ChatSession::new("u-1", 10);
        assert!(session.should_offer("overdue-invoices"));
        assert!(!session.should_offer("overdue-invoices"));

        session.open();
        assert!(session.is_open());
        session.close();
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_blank_message_is_skipped() {
        let transport = ScriptedTransport::default();
        let mut session = ChatSession::new("u-1", 10);
        let outcome = session.send(&transport, "   ", None, &CancellationToken::new()).await;
        assert_eq!(outcome, SendOutcome::Skipped);
        assert!(session.messages().is_empty());
    }
}
