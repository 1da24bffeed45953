use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::config::ClientConfig;
use shared::models::{
    ChatRequest, ChatResponse, ConversationMessagesResponse, ListConversationsResponse,
};

use crate::auth::TokenSource;
use crate::error::TransportError;

pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// The default chat-completion endpoint as seen by the queue engine.
pub trait ChatTransport: Send + Sync {
    fn send_chat<'a>(&'a self, request: &'a ChatRequest) -> TransportFuture<'a, ChatResponse>;
}

/// Calls the Jarvis API with the app session token.
#[derive(Clone)]
pub struct HttpChatTransport {
    client: reqwest::Client,
    api_base_url: Url,
    tokens: Arc<dyn TokenSource>,
}

impl HttpChatTransport {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_http_client(config.request_timeout_ms)?,
            api_base_url: parse_base_url(&config.api_base_url)?,
            tokens,
        })
    }

    pub async fn load_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationMessagesResponse, TransportError> {
        let url = join_path(
            &self.api_base_url,
            &["v1", "conversations", conversation_id, "messages"],
        )?;
        let token = require_session_token(self.tokens.as_ref()).await?;
        send_json(self.client.get(url).bearer_auth(token)).await
    }

    pub async fn list_conversations(&self) -> Result<ListConversationsResponse, TransportError> {
        let url = join_path(&self.api_base_url, &["v1", "conversations"])?;
        let token = require_session_token(self.tokens.as_ref()).await?;
        send_json(self.client.get(url).bearer_auth(token)).await
    }
}

impl ChatTransport for HttpChatTransport {
    fn send_chat<'a>(&'a self, request: &'a ChatRequest) -> TransportFuture<'a, ChatResponse> {
        Box::pin(async move {
            let url = join_path(&self.api_base_url, &["v1", "chat"])?;
            let token = require_session_token(self.tokens.as_ref()).await?;
            post_json(&self.client, url, &token, request).await
        })
    }
}

pub(crate) fn build_http_client(timeout_ms: u64) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|err| TransportError::InvalidRequest(format!("http client: {err}")))
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url, TransportError> {
    let url = Url::parse(raw)
        .map_err(|err| TransportError::InvalidRequest(format!("base url {raw}: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(TransportError::InvalidRequest(format!(
            "base url {raw} cannot carry a path"
        )));
    }
    Ok(url)
}

/// Appends percent-encoded path segments to `base`.
pub(crate) fn join_path(base: &Url, segments: &[&str]) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidRequest("base url cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) async fn require_session_token(
    tokens: &dyn TokenSource,
) -> Result<String, TransportError> {
    tokens
        .session_token()
        .await
        .ok_or(TransportError::MissingCredentials("session token"))
}

pub(crate) async fn post_json<B, T>(
    client: &reqwest::Client,
    url: Url,
    token: &str,
    body: &B,
) -> Result<T, TransportError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    send_json(client.post(url).bearer_auth(token).json(body)).await
}

pub(crate) async fn send_json<T>(request: reqwest::RequestBuilder) -> Result<T, TransportError>
where
    T: DeserializeOwned,
{
    let response = request
        .send()
        .await
        .map_err(|err| TransportError::from_reqwest(&err))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| TransportError::from_reqwest(&err))?;

    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            message: error_message_from_body(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
        });
    }

    serde_json::from_str(&body)
        .map_err(|err| TransportError::InvalidResponse(format!("unexpected response shape: {err}")))
}

/// Pulls a human-readable message out of an error body.
///
/// Accepts `{"error": "..."}` as well as `{"error": {"message": "..."}}`.
pub(crate) fn error_message_from_body(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    let message = match value.get("error")? {
        Value::String(message) => message.clone(),
        Value::Object(details) => details.get("message")?.as_str()?.to_string(),
        _ => return None,
    };

    let trimmed = message.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
