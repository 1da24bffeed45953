use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::config::{ClientConfig, DEFAULT_HISTORY_WINDOW};
use shared::models::{ChatRequest, ChatTurn, IntegrationId};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::auth::TokenSource;
use crate::error::{QueueError, TransportError};
use crate::integrations::{
    CalendarIntegration, IntegrationContext, IntegrationRegistry, MermaidIntegration,
};
use crate::listener::ConversationListener;
use crate::pipeline::{CalendarQueryPipeline, HttpPipelineServices};
use crate::queue::{Dispatch, DuplicatePolicy, QueueItemId, QueueSnapshotItem, SessionState};
use crate::transport::{ChatTransport, HttpChatTransport};

/// One chat session: a transcript plus a single-flight queue of pending messages.
///
/// `enqueue` returns immediately; a background task drains the queue one
/// message at a time. Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: Mutex<SessionState>,
    idle: watch::Sender<bool>,
    transport: Arc<dyn ChatTransport>,
    tokens: Arc<dyn TokenSource>,
    registry: IntegrationRegistry,
    listener: Option<Arc<dyn ConversationListener>>,
}

impl SessionInner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ChatSessionBuilder {
    transport: Arc<dyn ChatTransport>,
    tokens: Arc<dyn TokenSource>,
    registry: IntegrationRegistry,
    listener: Option<Arc<dyn ConversationListener>>,
    history_window: usize,
    duplicate_policy: DuplicatePolicy,
}

impl ChatSessionBuilder {
    pub fn new(transport: Arc<dyn ChatTransport>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            transport,
            tokens,
            registry: IntegrationRegistry::new(),
            listener: None,
            history_window: DEFAULT_HISTORY_WINDOW,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }

    pub fn registry(mut self, registry: IntegrationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ConversationListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn build(self) -> ChatSession {
        let (idle, _) = watch::channel(true);
        ChatSession {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState::new(
                    self.history_window,
                    self.duplicate_policy,
                )),
                idle,
                transport: self.transport,
                tokens: self.tokens,
                registry: self.registry,
                listener: self.listener,
            }),
        }
    }
}

impl ChatSession {
    pub fn builder(
        transport: Arc<dyn ChatTransport>,
        tokens: Arc<dyn TokenSource>,
    ) -> ChatSessionBuilder {
        ChatSessionBuilder::new(transport, tokens)
    }

    /// Wires HTTP transports plus the calendar and Mermaid integrations.
    pub fn from_config(
        config: &ClientConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<ChatSessionBuilder, TransportError> {
        let transport = Arc::new(HttpChatTransport::new(config, tokens.clone())?);
        let services = Arc::new(HttpPipelineServices::new(config, tokens.clone())?);
        let pipeline = CalendarQueryPipeline::from_client_config(services, config);
        let registry = IntegrationRegistry::new()
            .with(Arc::new(CalendarIntegration::new(pipeline, tokens.clone())))
            .with(Arc::new(MermaidIntegration::new()));

        Ok(ChatSessionBuilder::new(transport, tokens)
            .registry(registry)
            .history_window(config.history_window))
    }

    /// Queues a message and starts the drain loop if it is not running.
    ///
    /// Empty and duplicate text is rejected without touching `last_error`.
    pub fn enqueue(
        &self,
        text: &str,
        conversation_id_hint: Option<&str>,
    ) -> Result<QueueItemId, QueueError> {
        let (item_id, should_spawn) = {
            let mut state = self.inner.lock_state();
            let item_id = match state.enqueue(text, conversation_id_hint) {
                Ok(item_id) => item_id,
                Err(err) => {
                    debug!(error = %err, "message rejected at enqueue");
                    return Err(err);
                }
            };
            debug!(item_id = %item_id, queued = state.queue().len(), "message enqueued");
            self.inner.idle.send_replace(false);
            (item_id, state.try_start_processing())
        };

        if should_spawn {
            tokio::spawn(drain_queue(self.inner.clone()));
        }
        Ok(item_id)
    }

    /// Loads persisted turns into an empty transcript.
    pub fn hydrate(&self, conversation_id: &str, turns: Vec<ChatTurn>) -> bool {
        self.inner.lock_state().hydrate(conversation_id, turns)
    }

    pub fn toggle_integration(&self, id: IntegrationId) -> bool {
        self.inner.lock_state().toggle_integration(id)
    }

    pub fn set_integration_active(&self, id: IntegrationId, active: bool) {
        self.inner.lock_state().set_integration_active(id, active);
    }

    pub fn active_integrations(&self) -> BTreeSet<IntegrationId> {
        self.inner.lock_state().active_integrations().clone()
    }

    pub fn transcript(&self) -> Vec<ChatTurn> {
        self.inner.lock_state().transcript().to_vec()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.inner.lock_state().conversation_id().map(ToString::to_string)
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock_state().last_error().map(ToString::to_string)
    }

    pub fn is_processing(&self) -> bool {
        self.inner.lock_state().is_processing()
    }

    pub fn queue_snapshot(&self) -> Vec<QueueSnapshotItem> {
        self.inner.lock_state().queue().snapshot()
    }

    pub fn remove_by_id(&self, id: QueueItemId) -> Result<String, QueueError> {
        self.inner.lock_state().queue_mut().remove_by_id(id)
    }

    pub fn remove_at(&self, index: usize) -> Result<String, QueueError> {
        self.inner.lock_state().queue_mut().remove_at(index)
    }

    pub fn remove_text(&self, text: &str) -> Result<String, QueueError> {
        self.inner.lock_state().queue_mut().remove_text(text)
    }

    pub fn move_item(&self, from: usize, to: usize) -> Result<(), QueueError> {
        self.inner.lock_state().queue_mut().move_item(from, to)
    }

    /// Resolves once the queue is empty and nothing is in flight.
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

const INTERRUPTED_SEND_ERROR: &str = "Something went wrong while sending this message.";

/// Releases the processing slot if the drain task exits without doing so.
///
/// A drain task that unwinds or is dropped mid-send still fails the in-flight
/// item and hands any remaining messages to a fresh drain task.
struct ProcessingGuard {
    inner: Arc<SessionInner>,
    in_flight: Option<QueueItemId>,
    released: bool,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let restart = {
            let mut state = self.inner.lock_state();
            if let Some(item_id) = self.in_flight.take() {
                warn!(item_id = %item_id, "message dropped after the send was interrupted");
                state.complete_failure(item_id, INTERRUPTED_SEND_ERROR.to_string());
            }
            state.stop_processing();
            let restart = !state.queue().is_empty() && state.try_start_processing();
            self.inner.idle.send_replace(state.is_idle());
            restart
        };

        if !restart {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(drain_queue(self.inner.clone()));
            }
            Err(_) => {
                // The next enqueue starts a drain task.
                self.inner.lock_state().stop_processing();
            }
        }
    }
}

async fn drain_queue(inner: Arc<SessionInner>) {
    let mut guard = ProcessingGuard {
        inner: inner.clone(),
        in_flight: None,
        released: false,
    };

    loop {
        let dispatch = {
            let mut state = inner.lock_state();
            match state.begin_next() {
                Some(dispatch) => dispatch,
                None => {
                    state.stop_processing();
                    guard.released = true;
                    inner.idle.send_replace(state.is_idle());
                    break;
                }
            }
        };
        guard.in_flight = Some(dispatch.item_id);
        debug!(item_id = %dispatch.item_id, "message dequeued");

        match process_dispatch(&inner, &dispatch).await {
            Ok(reply) => {
                let conversation_id = {
                    let mut state = inner.lock_state();
                    state.complete_success(
                        dispatch.item_id,
                        reply.content,
                        reply.conversation_id.as_deref(),
                    );
                    state.conversation_id().map(ToString::to_string)
                };
                guard.in_flight = None;
                if let Some(listener) = inner.listener.as_ref() {
                    listener.message_sent(conversation_id.as_deref());
                }
            }
            Err(message) => {
                warn!(item_id = %dispatch.item_id, error = %message, "message dropped after failure");
                inner
                    .lock_state()
                    .complete_failure(dispatch.item_id, message);
                guard.in_flight = None;
            }
        }

        tokio::task::yield_now().await;
    }
}

struct Reply {
    content: String,
    conversation_id: Option<String>,
}

/// Sends one message. Errors come back as user-facing strings.
async fn process_dispatch(inner: &SessionInner, dispatch: &Dispatch) -> Result<Reply, String> {
    let integration_context = IntegrationContext {
        history: dispatch.context.clone(),
        conversation_id: dispatch.conversation_id.clone(),
    };
    let integrations = inner
        .registry
        .dispatch(
            &dispatch.active_integrations,
            &dispatch.text,
            &integration_context,
        )
        .await;

    if let Some(answer) = integrations.final_answer {
        return Ok(Reply {
            content: answer,
            conversation_id: None,
        });
    }

    let request = ChatRequest {
        messages: dispatch.context.clone(),
        conversation_id: dispatch.conversation_id.clone(),
        original_input: dispatch.text.clone(),
        optimized_input: integrations.modified_input.clone(),
        active_integrations: dispatch.active_integrations.clone(),
        provider_token: inner.tokens.provider_token().await,
        system_prompt: integrations.combined_system_prompt(),
    };

    let response = inner
        .transport
        .send_chat(&request)
        .await
        .map_err(|err| user_facing_error(&err))?;

    Ok(Reply {
        content: response.content,
        conversation_id: Some(response.conversation_id),
    })
}

fn user_facing_error(err: &TransportError) -> String {
    match err {
        TransportError::Timeout => "The request timed out. Please try again.".to_string(),
        TransportError::Status { message, .. } => format!("Failed to send message: {message}"),
        TransportError::MissingCredentials(_) => {
            "You are signed out. Sign in again to keep chatting.".to_string()
        }
        other => format!("Failed to send message: {other}"),
    }
}
