use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tracing::{error, instrument};

use super::types::{Attachment, ChatErrorBody, ChatReply, ChatRequest, FileDescriptor};
use crate::error::AssistantError;

#[async_trait]
pub trait AssistantTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, AssistantError>;

    async fn upload(&self, attachment: Attachment) -> Result<FileDescriptor, AssistantError>;
}

/// Talks to the assistant backend: `POST {base}/chat` and
/// `POST {base}/chat/upload`.
pub struct HttpAssistantTransport {
    client: Client,
    base_url: String,
}

impl HttpAssistantTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Turns a non-success response into a server error, using the structured
/// body when there is one.
async fn server_error(response: Response) -> AssistantError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    error!("Assistant returned {}: {}", status, text);

    match serde_json::from_str::<ChatErrorBody>(&text) {
        Ok(body) => AssistantError::Server {
            message: body.error,
            retryable: body.retryable,
        },
        Err(_) => AssistantError::Server {
            message: format!("The assistant returned an error ({})", status.as_u16()),
            retryable: status.is_server_error(),
        },
    }
}

#[async_trait]
impl AssistantTransport for HttpAssistantTransport {
    #[instrument(skip(self, request), fields(history = request.history.len()))]
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, AssistantError> {
        let response = self.client.post(self.url("chat")).json(request).send().await?;
        if !response.status().is_success() {
            return Err(server_error(response).await);
        }
        Ok(response.json::<ChatReply>().await?)
    }

    #[instrument(skip(self, attachment), fields(file = %attachment.file_name))]
    async fn upload(&self, attachment: Attachment) -> Result<FileDescriptor, AssistantError> {
        let part = Part::bytes(attachment.bytes)
            .file_name(attachment.file_name)
            .mime_str(&attachment.content_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("chat/upload"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(server_error(response).await);
        }
        Ok(response.json::<FileDescriptor>().await?)
    }
}
