use std::future::Future;

use reqwest::{Client, RequestBuilder, Response, Url};
use tracing::debug;

use tandem_types::api::SendMessageRequest;
use tandem_types::models::{Message, MessageKind, Session};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// The server operations the client consumes. The owning participant is
/// implied by the source's credentials.
pub trait SessionSource: Send + Sync + 'static {
    fn fetch_sessions(&self) -> impl Future<Output = Result<Vec<Session>, ClientError>> + Send;

    fn mark_read(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn load_messages(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<Message>, ClientError>> + Send;

    fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        kind: MessageKind,
        recipient_id: Option<&str>,
    ) -> impl Future<Output = Result<Message, ClientError>> + Send;
}

/// [`SessionSource`] over the REST API. Requests carry no timeout.
pub struct HttpSource {
    client: Client,
    base: Url,
    token: String,
}

impl HttpSource {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.base_url.clone()));
        }
        Ok(Self {
            client: Client::new(),
            base,
            token: config.token.clone(),
        })
    }

    /// Base URL plus percent-encoded path segments. Conversation ids may
    /// contain `%`, so they must never be spliced into a URL string.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, segments: &[&str]) -> RequestBuilder {
        self.client.get(self.url(segments)).bearer_auth(&self.token)
    }

    fn post(&self, segments: &[&str]) -> RequestBuilder {
        self.client.post(self.url(segments)).bearer_auth(&self.token)
    }
}

async fn checked(request: RequestBuilder) -> Result<Response, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        debug!("Request failed with {}", status);
        return Err(ClientError::Rejected {
            status: status.as_u16(),
        });
    }
    Ok(response)
}

impl SessionSource for HttpSource {
    async fn fetch_sessions(&self) -> Result<Vec<Session>, ClientError> {
        Ok(checked(self.get(&["sessions"])).await?.json().await?)
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), ClientError> {
        checked(self.post(&["conversations", conversation_id, "read"])).await?;
        Ok(())
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError> {
        let request = self.get(&["conversations", conversation_id, "messages"]);
        Ok(checked(request).await?.json().await?)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        kind: MessageKind,
        recipient_id: Option<&str>,
    ) -> Result<Message, ClientError> {
        let body = SendMessageRequest {
            content: content.to_string(),
            kind,
            recipient_id: recipient_id.map(str::to_string),
        };
        let request = self
            .post(&["conversations", conversation_id, "messages"])
            .json(&body);
        Ok(checked(request).await?.json().await?)
    }
}
