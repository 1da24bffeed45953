use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use shared::models::{ChatTurn, IntegrationId};
use tracing::{debug, warn};

use crate::error::IntegrationError;

mod calendar;
mod mermaid;

pub use calendar::CalendarIntegration;
pub use mermaid::MermaidIntegration;

pub type IntegrationFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What an integration sees about the message being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationContext {
    /// History window followed by the new user turn.
    pub history: Vec<ChatTurn>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationResultContext {
    pub error: Option<String>,
    pub events_found: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationResult {
    pub system_prompt: Option<String>,
    /// Replacement input for the model, or the whole reply when
    /// `requires_special_handling` is set.
    pub modified_input: Option<String>,
    pub context: IntegrationResultContext,
    pub requires_special_handling: bool,
}

impl IntegrationResult {
    pub fn prompt_only(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            ..Self::default()
        }
    }

    pub fn final_answer(answer: impl Into<String>) -> Self {
        Self {
            modified_input: Some(answer.into()),
            requires_special_handling: true,
            ..Self::default()
        }
    }
}

/// A pluggable capability consulted before the default chat call.
///
/// `process_message` reports expected failures through
/// `IntegrationResult::context.error` instead of failing; `prepare` failing
/// means "skip this integration for this message".
pub trait Integration: Send + Sync {
    fn id(&self) -> IntegrationId;

    fn name(&self) -> &'static str;

    /// Prompt added to the default chat call when this integration does not
    /// author the reply itself.
    fn system_prompt(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    fn can_handle(&self, text: &str, context: &IntegrationContext) -> bool;

    fn prepare<'a>(
        &'a self,
        context: &'a IntegrationContext,
    ) -> IntegrationFuture<'a, Result<(), IntegrationError>>;

    fn process_message<'a>(
        &'a self,
        text: &'a str,
        context: &'a IntegrationContext,
    ) -> IntegrationFuture<'a, IntegrationResult>;
}

/// Combined outcome of running the active integrations for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationDispatch {
    /// Set when an integration authored the reply itself.
    pub final_answer: Option<String>,
    pub system_prompts: Vec<String>,
    pub modified_input: Option<String>,
}

impl IntegrationDispatch {
    pub fn combined_system_prompt(&self) -> Option<String> {
        (!self.system_prompts.is_empty()).then(|| self.system_prompts.join("\n\n"))
    }
}

#[derive(Clone, Default)]
pub struct IntegrationRegistry {
    integrations: BTreeMap<IntegrationId, Arc<dyn Integration>>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, integration: Arc<dyn Integration>) -> &mut Self {
        self.integrations.insert(integration.id(), integration);
        self
    }

    pub fn with(mut self, integration: Arc<dyn Integration>) -> Self {
        self.register(integration);
        self
    }

    /// Runs the active integrations in id order.
    ///
    /// Stops at the first integration that authors the reply. Unknown,
    /// disabled or unwilling integrations are skipped, as are those whose
    /// `prepare` fails.
    pub async fn dispatch(
        &self,
        active: &[IntegrationId],
        text: &str,
        context: &IntegrationContext,
    ) -> IntegrationDispatch {
        let mut outcome = IntegrationDispatch::default();

        for id in active {
            let Some(integration) = self.integrations.get(id) else {
                debug!(integration = id.as_str(), "active integration is not registered");
                continue;
            };
            if !integration.enabled() || !integration.can_handle(text, context) {
                continue;
            }
            if let Err(err) = integration.prepare(context).await {
                warn!(integration = id.as_str(), error = %err, "integration skipped");
                continue;
            }

            let result = integration.process_message(text, context).await;
            if let Some(error) = result.context.error.as_deref() {
                warn!(integration = id.as_str(), error, "integration degraded");
            }

            if result.requires_special_handling
                && let Some(answer) = result.modified_input
            {
                outcome.final_answer = Some(answer);
                return outcome;
            }
            if let Some(prompt) = result.system_prompt.filter(|prompt| !prompt.trim().is_empty()) {
                outcome.system_prompts.push(prompt);
            }
            if let Some(input) = result.modified_input {
                outcome.modified_input = Some(input);
            }
        }

        outcome
    }
}
